mod middleware;
mod password;
mod session;
mod token;

pub use middleware::{Actor, AuthError, RequireActor, RequireAdmin, RequireUser, AGENT_TOKEN_HEADER};
pub use password::{hash_password, verify_password};
pub use session::{generate_session_token, hash_session_token, SESSION_TTL_DAYS};
pub use token::{AgentTokenGenerator, parse_agent_token};
