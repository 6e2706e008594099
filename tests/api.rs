mod common;

use common::test_server::TestServer;
use reqwest::Client;
use serde_json::{Value, json};

async fn create_document(
    client: &Client,
    base_url: &str,
    token: &str,
    title: &str,
    content: &str,
) -> Value {
    let resp = client
        .post(format!("{}/api/v1/documents", base_url))
        .bearer_auth(token)
        .json(&json!({ "title": title, "content": content }))
        .send()
        .await
        .expect("create document");
    assert_eq!(resp.status(), 201, "create should return 201");
    resp.json().await.expect("parse document")
}

#[tokio::test]
async fn test_document_version_and_rollback_flow() {
    let server = TestServer::start().await;
    let client = Client::new();
    let token = server.admin_session().await;

    let doc = create_document(&client, &server.base_url, &token, "intro", "# Intro\n\nv1 body\n").await;
    let doc_id = doc["id"].as_str().unwrap();
    assert_eq!(doc["latest_version"], json!(1));
    let checksum_v1 = doc["checksum"].as_str().unwrap().to_string();

    // Content update bumps the version and changes the checksum.
    let updated: Value = client
        .put(format!("{}/api/v1/documents/{}", server.base_url, doc_id))
        .bearer_auth(&token)
        .json(&json!({ "content": "# Intro\n\nv2 body\n", "change_note": "rewrite" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(updated["latest_version"], json!(2));
    assert_ne!(updated["checksum"].as_str().unwrap(), checksum_v1);

    // Metadata-only update does not create a version.
    let touched: Value = client
        .put(format!("{}/api/v1/documents/{}", server.base_url, doc_id))
        .bearer_auth(&token)
        .json(&json!({ "description": "the intro doc" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(touched["latest_version"], json!(2));

    // Rollback produces version 3 with v1's exact content.
    let rolled: Value = client
        .post(format!(
            "{}/api/v1/documents/{}/rollback",
            server.base_url, doc_id
        ))
        .bearer_auth(&token)
        .json(&json!({ "target_version": 1 }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(rolled["latest_version"], json!(3));
    assert_eq!(rolled["checksum"].as_str().unwrap(), checksum_v1);

    let resp = client
        .get(format!(
            "{}/api/v1/documents/{}?include_raw=true",
            server.base_url, doc_id
        ))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    let etag = resp
        .headers()
        .get("etag")
        .and_then(|h| h.to_str().ok())
        .unwrap()
        .to_string();
    assert_eq!(etag, format!("\"{}\"", checksum_v1));
    let fetched: Value = resp.json().await.unwrap();
    assert_eq!(fetched["content"].as_str().unwrap(), "# Intro\n\nv1 body\n");

    // The ledger is gapless and ascending.
    let versions: Value = client
        .get(format!(
            "{}/api/v1/documents/{}/versions",
            server.base_url, doc_id
        ))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let numbers: Vec<i64> = versions["versions"]
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v["version_number"].as_i64().unwrap())
        .collect();
    assert_eq!(numbers, vec![1, 2, 3]);

    // Rolling back to a version that never existed is a validation error.
    let resp = client
        .post(format!(
            "{}/api/v1/documents/{}/rollback",
            server.base_url, doc_id
        ))
        .bearer_auth(&token)
        .json(&json!({ "target_version": 42 }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let err: Value = resp.json().await.unwrap();
    assert_eq!(err["error"]["code"], json!("validation_error"));
}

#[tokio::test]
async fn test_idempotent_create_replays_verbatim() {
    let server = TestServer::start().await;
    let client = Client::new();
    let token = server.admin_session().await;

    let body = json!({ "title": "once", "content": "only once\n" });
    let mut responses = Vec::new();
    for _ in 0..2 {
        let resp = client
            .post(format!("{}/api/v1/documents", server.base_url))
            .bearer_auth(&token)
            .header("Idempotency-Key", "create-once-1")
            .json(&body)
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 201);
        responses.push(resp.json::<Value>().await.unwrap());
    }
    assert_eq!(responses[0], responses[1]);

    let doc_id = responses[0]["id"].as_str().unwrap();

    // Exactly one version and one create audit entry despite the retry.
    let versions: Value = client
        .get(format!(
            "{}/api/v1/documents/{}/versions",
            server.base_url, doc_id
        ))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(versions["versions"].as_array().unwrap().len(), 1);

    let logs: Value = client
        .get(format!(
            "{}/api/v1/audit-logs?action=document.create",
            server.base_url
        ))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let creates_for_doc = logs["data"]
        .as_array()
        .unwrap()
        .iter()
        .filter(|e| e["resource_id"] == json!(doc_id))
        .count();
    assert_eq!(creates_for_doc, 1);

    // Idempotent rollback: same key, one new version.
    client
        .put(format!("{}/api/v1/documents/{}", server.base_url, doc_id))
        .bearer_auth(&token)
        .json(&json!({ "content": "second\n" }))
        .send()
        .await
        .unwrap();
    for _ in 0..2 {
        let resp = client
            .post(format!(
                "{}/api/v1/documents/{}/rollback",
                server.base_url, doc_id
            ))
            .bearer_auth(&token)
            .header("Idempotency-Key", "rollback-once-1")
            .json(&json!({ "target_version": 1 }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
    }
    let versions: Value = client
        .get(format!(
            "{}/api/v1/documents/{}/versions",
            server.base_url, doc_id
        ))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(versions["versions"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn test_agent_scopes_are_enforced() {
    let server = TestServer::start().await;
    let client = Client::new();
    let token = server.admin_session().await;

    let doc = create_document(&client, &server.base_url, &token, "scoped", "body\n").await;
    let doc_id = doc["id"].as_str().unwrap();

    let resp: Value = client
        .post(format!("{}/api/v1/agents/tokens", server.base_url))
        .bearer_auth(&token)
        .json(&json!({ "name": "reader-bot", "scopes": ["documents:read"] }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let agent_token = resp["token"].as_str().unwrap().to_string();
    assert!(agent_token.starts_with("mdb_"));

    // Read succeeds with documents:read.
    let resp = client
        .get(format!("{}/api/v1/documents/{}", server.base_url, doc_id))
        .header("X-Agent-Token", &agent_token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    // Write is forbidden without documents:write.
    let resp = client
        .put(format!("{}/api/v1/documents/{}", server.base_url, doc_id))
        .header("X-Agent-Token", &agent_token)
        .json(&json!({ "content": "nope\n" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 403);
    let err: Value = resp.json().await.unwrap();
    assert_eq!(err["error"]["code"], json!("forbidden"));
    assert!(err["error"]["request_id"].is_string());

    // An unknown credential is rejected outright.
    let resp = client
        .get(format!("{}/api/v1/documents", server.base_url))
        .header("X-Agent-Token", "mdb_00000000_000000000000000000000000")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);

    // A writer credential can mutate.
    let resp: Value = client
        .post(format!("{}/api/v1/agents/tokens", server.base_url))
        .bearer_auth(&token)
        .json(&json!({ "name": "writer-bot", "scopes": ["documents:read", "documents:write"] }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let writer_token = resp["token"].as_str().unwrap();
    let resp = client
        .put(format!("{}/api/v1/documents/{}", server.base_url, doc_id))
        .header("X-Agent-Token", writer_token)
        .json(&json!({ "content": "agent edit\n" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    // Agents never manage folders, regardless of scopes.
    let resp = client
        .post(format!("{}/api/v1/folders", server.base_url))
        .header("X-Agent-Token", writer_token)
        .json(&json!({ "name": "nope" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 403);
}

#[tokio::test]
async fn test_folder_rename_cascades() {
    let server = TestServer::start().await;
    let client = Client::new();
    let token = server.admin_session().await;

    let guides: Value = client
        .post(format!("{}/api/v1/folders", server.base_url))
        .bearer_auth(&token)
        .json(&json!({ "name": "Guides" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let setup: Value = client
        .post(format!("{}/api/v1/folders", server.base_url))
        .bearer_auth(&token)
        .json(&json!({ "name": "Setup", "parent_id": guides["id"] }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    let resp = client
        .post(format!("{}/api/v1/documents", server.base_url))
        .bearer_auth(&token)
        .json(&json!({
            "title": "intro",
            "content": "body\n",
            "folder_id": setup["id"],
        }))
        .send()
        .await
        .unwrap();
    let inside: Value = resp.json().await.unwrap();
    assert_eq!(inside["file_path"], json!("/guides/setup/intro.md"));

    let outside = create_document(&client, &server.base_url, &token, "loose", "x\n").await;
    assert_eq!(outside["file_path"], json!("/loose.md"));

    // Renaming the top folder rewrites every descendant document location.
    let renamed: Value = client
        .put(format!(
            "{}/api/v1/folders/{}",
            server.base_url,
            guides["id"].as_str().unwrap()
        ))
        .bearer_auth(&token)
        .json(&json!({ "name": "Handbook" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(renamed["directory_name"], json!("handbook"));

    let moved: Value = client
        .get(format!(
            "{}/api/v1/documents/{}",
            server.base_url,
            inside["id"].as_str().unwrap()
        ))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(moved["file_path"], json!("/handbook/setup/intro.md"));

    let untouched: Value = client
        .get(format!(
            "{}/api/v1/documents/{}",
            server.base_url,
            outside["id"].as_str().unwrap()
        ))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(untouched["file_path"], json!("/loose.md"));

    // Reparenting under a descendant is rejected.
    let resp = client
        .put(format!(
            "{}/api/v1/folders/{}",
            server.base_url,
            guides["id"].as_str().unwrap()
        ))
        .bearer_auth(&token)
        .json(&json!({ "parent_id": setup["id"] }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    // Deleting the subtree relocates documents to the former parent.
    let deleted: Value = client
        .delete(format!(
            "{}/api/v1/folders/{}",
            server.base_url,
            setup["id"].as_str().unwrap()
        ))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(deleted["folders_removed"], json!(1));

    let relocated: Value = client
        .get(format!(
            "{}/api/v1/documents/{}",
            server.base_url,
            inside["id"].as_str().unwrap()
        ))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(relocated["folder_id"], guides["id"]);
    assert_eq!(relocated["file_path"], json!("/handbook/intro.md"));
}

#[tokio::test]
async fn test_soft_delete_hides_but_keeps_history() {
    let server = TestServer::start().await;
    let client = Client::new();
    let token = server.admin_session().await;

    let doc = create_document(&client, &server.base_url, &token, "ephemeral", "gone soon\n").await;
    let doc_id = doc["id"].as_str().unwrap();

    let resp = client
        .delete(format!("{}/api/v1/documents/{}", server.base_url, doc_id))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 204);

    // Gone from direct reads, listings, and search.
    let resp = client
        .get(format!("{}/api/v1/documents/{}", server.base_url, doc_id))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);

    let listed: Value = client
        .get(format!("{}/api/v1/documents", server.base_url))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(listed["pagination"]["total"], json!(0));

    let found: Value = client
        .get(format!("{}/api/v1/search?q=gone", server.base_url))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(found["pagination"]["total"], json!(0));

    // But the ledger survives.
    let versions: Value = client
        .get(format!(
            "{}/api/v1/documents/{}/versions",
            server.base_url, doc_id
        ))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(versions["versions"].as_array().unwrap().len(), 1);

    // Deleting twice is not found.
    let resp = client
        .delete(format!("{}/api/v1/documents/{}", server.base_url, doc_id))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn test_chunks_reassemble_to_document() {
    let server = TestServer::start().await;
    let client = Client::new();
    let token = server.admin_session().await;

    let line = format!("{}\n", "lorem ipsum dolor sit amet ".repeat(4).trim_end());
    let filler = line.repeat(10);
    let content = format!("# One\n{filler}## Two\n{filler}# Three\n{filler}");
    let doc = create_document(&client, &server.base_url, &token, "chunky", &content).await;

    let resp: Value = client
        .get(format!(
            "{}/api/v1/documents/{}/chunks?max_tokens=128",
            server.base_url,
            doc["id"].as_str().unwrap()
        ))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(resp["document_id"], doc["id"]);
    assert_eq!(resp["checksum"], doc["checksum"]);

    let chunks = resp["chunks"].as_array().unwrap();
    assert!(chunks.len() > 1);

    let reassembled: String = chunks
        .iter()
        .map(|c| c["text"].as_str().unwrap())
        .collect();
    assert_eq!(reassembled, content);

    for chunk in chunks {
        assert!(chunk["token_estimate"].as_i64().unwrap() <= 128);
        assert!(chunk["start_line"].as_i64().unwrap() >= 1);
    }

    let last = chunks.last().unwrap();
    assert_eq!(last["heading_path"], json!(["Three"]));
}

#[tokio::test]
async fn test_share_links_with_access_code() {
    let server = TestServer::start().await;
    let client = Client::new();
    let token = server.admin_session().await;

    let doc = create_document(&client, &server.base_url, &token, "shared", "secret notes\n").await;
    let doc_id = doc["id"].as_str().unwrap();

    let share: Value = client
        .post(format!(
            "{}/api/v1/documents/{}/share",
            server.base_url, doc_id
        ))
        .bearer_auth(&token)
        .json(&json!({ "access_code": "open-sesame" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let share_token = share["token"].as_str().unwrap();

    // No code → forbidden; wrong code → forbidden; right code → content,
    // all without authentication.
    let resp = reqwest::get(format!("{}/share/{}", server.base_url, share_token))
        .await
        .unwrap();
    assert_eq!(resp.status(), 403);

    let resp = reqwest::get(format!(
        "{}/share/{}?code=wrong",
        server.base_url, share_token
    ))
    .await
    .unwrap();
    assert_eq!(resp.status(), 403);

    let resp = reqwest::get(format!(
        "{}/share/{}?code=open-sesame",
        server.base_url, share_token
    ))
    .await
    .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["content"], json!("secret notes\n"));

    // Unknown tokens and soft-deleted targets both read as not found.
    let resp = reqwest::get(format!("{}/share/{}", server.base_url, "nonsense"))
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);

    client
        .delete(format!("{}/api/v1/documents/{}", server.base_url, doc_id))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    let resp = reqwest::get(format!(
        "{}/share/{}?code=open-sesame",
        server.base_url, share_token
    ))
    .await
    .unwrap();
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn test_search_ranks_and_snippets() {
    let server = TestServer::start().await;
    let client = Client::new();
    let token = server.admin_session().await;

    create_document(
        &client,
        &server.base_url,
        &token,
        "kubernetes runbook",
        "How to drain a node.\n",
    )
    .await;
    create_document(
        &client,
        &server.base_url,
        &token,
        "misc notes",
        format!("{} kubernetes appears once here {}\n", "x ".repeat(100), "y ".repeat(100)).as_str(),
    )
    .await;

    let resp: Value = client
        .get(format!("{}/api/v1/search?q=kubernetes", server.base_url))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    let hits = resp["data"].as_array().unwrap();
    assert_eq!(hits.len(), 2);
    // The title match outranks the body-only match.
    assert_eq!(hits[0]["title"], json!("kubernetes runbook"));
    assert!(hits[1]["snippet"].as_str().unwrap().contains("kubernetes"));
}

#[tokio::test]
async fn test_upload_multipart_documents() {
    let server = TestServer::start().await;
    let client = Client::new();
    let token = server.admin_session().await;

    let form = reqwest::multipart::Form::new()
        .text("category", "runbooks")
        .text("tags", "ops, oncall")
        .part(
            "file",
            reqwest::multipart::Part::text("# Drain\n\nsteps\n")
                .file_name("drain-node.md")
                .mime_str("text/markdown")
                .unwrap(),
        );

    let resp = client
        .post(format!("{}/api/v1/documents/upload", server.base_url))
        .bearer_auth(&token)
        .multipart(form)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);
    let body: Value = resp.json().await.unwrap();
    let created = body["data"].as_array().unwrap();
    assert_eq!(created.len(), 1);
    assert_eq!(created[0]["title"], json!("drain-node"));
    assert_eq!(created[0]["category"], json!("runbooks"));
    assert_eq!(created[0]["tags"], json!(["ops", "oncall"]));
    assert_eq!(created[0]["latest_version"], json!(1));
}

#[tokio::test]
async fn test_error_envelope_and_auth() {
    let server = TestServer::start().await;
    let client = Client::new();

    // Missing credentials.
    let resp = client
        .get(format!("{}/api/v1/documents", server.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);
    let err: Value = resp.json().await.unwrap();
    assert_eq!(err["error"]["code"], json!("unauthorized"));
    assert!(err["error"]["message"].is_string());
    assert!(err["error"]["request_id"].is_string());

    // Bad login.
    let resp = client
        .post(format!("{}/api/auth/login", server.base_url))
        .json(&json!({ "username": "ghost", "password": "nope-nope" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);

    // Unknown folder on create is a validation error with a hint.
    let token = server.admin_session().await;
    let resp = client
        .post(format!("{}/api/v1/documents", server.base_url))
        .bearer_auth(&token)
        .json(&json!({ "title": "x", "content": "y\n", "folder_id": "missing" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let err: Value = resp.json().await.unwrap();
    assert_eq!(err["error"]["code"], json!("validation_error"));
    assert!(err["error"]["hint"].is_string());
}

#[tokio::test]
async fn test_admin_user_management() {
    let server = TestServer::start().await;
    let client = Client::new();
    let token = server.admin_session().await;

    let resp = client
        .post(format!("{}/api/v1/admin/users", server.base_url))
        .bearer_auth(&token)
        .json(&json!({ "username": "erin", "password": "correct-horse", "role": "editor" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);

    // Duplicate usernames conflict.
    let resp = client
        .post(format!("{}/api/v1/admin/users", server.base_url))
        .bearer_auth(&token)
        .json(&json!({ "username": "erin", "password": "another-pass" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 409);
    let err: Value = resp.json().await.unwrap();
    assert_eq!(err["error"]["code"], json!("conflict"));

    // The new user can log in but cannot reach admin surfaces.
    let login: Value = client
        .post(format!("{}/api/auth/login", server.base_url))
        .json(&json!({ "username": "erin", "password": "correct-horse" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let erin_token = login["token"].as_str().unwrap();

    let me: Value = client
        .get(format!("{}/api/auth/me", server.base_url))
        .bearer_auth(erin_token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(me["username"], json!("erin"));
    assert_eq!(me["role"], json!("editor"));

    let resp = client
        .get(format!("{}/api/v1/admin/users", server.base_url))
        .bearer_auth(erin_token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 403);

    // The bootstrap admin is protected from deletion while alone.
    let resp = client
        .delete(format!(
            "{}/api/v1/admin/users/{}",
            server.base_url, server.admin_username
        ))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 409);

    // Settings round-trip.
    let resp: Value = client
        .put(format!("{}/api/v1/admin/settings", server.base_url))
        .bearer_auth(&token)
        .json(&json!({ "site_name": "team docs" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(resp["site_name"], json!("team docs"));
}

#[tokio::test]
async fn test_batch_operations_report_per_item() {
    let server = TestServer::start().await;
    let client = Client::new();
    let token = server.admin_session().await;

    let a = create_document(&client, &server.base_url, &token, "a", "a\n").await;
    let b = create_document(&client, &server.base_url, &token, "b", "b\n").await;

    let resp: Value = client
        .post(format!("{}/api/v1/documents/batch-delete", server.base_url))
        .bearer_auth(&token)
        .json(&json!({ "ids": [a["id"], b["id"], "missing-id"] }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    let results = resp["results"].as_array().unwrap();
    assert_eq!(results.len(), 3);
    assert_eq!(results[0]["ok"], json!(true));
    assert_eq!(results[1]["ok"], json!(true));
    assert_eq!(results[2]["ok"], json!(false));
    assert!(results[2]["error"].is_string());
}
