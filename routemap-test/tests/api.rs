use anyhow::Result;
use routemap_core::Config;
use routemap_test::fixtures;
use routemap_test::harness::TestApp;
use serde_json::json;

fn app() -> TestApp {
    TestApp::new(Config::default())
}

// ─── Health and status ──────────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_health() -> Result<()> {
    let app = app();
    let resp = app.get_json("/health").await?;
    assert_eq!(resp["success"], true);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_status_reflects_workspaces() -> Result<()> {
    let app = app();

    let empty = app.get_json("/status").await?;
    assert_eq!(empty["data"]["workspace_count"], 0);

    app.post_json(
        "/api/workspaces/lab/records",
        json!({ "records": fixtures::steady_stream() }),
    )
    .await?;

    let status = app.get_json("/status").await?;
    assert_eq!(status["data"]["workspace_count"], 1);
    assert_eq!(status["data"]["workspaces"]["lab"]["record_count"], 3);
    Ok(())
}

// ─── Ingest and graph ───────────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_ingest_builds_graph() -> Result<()> {
    let app = app();

    let ingest = app
        .post_json(
            "/api/workspaces/lab/records",
            json!({ "records": fixtures::route_change_stream() }),
        )
        .await?;
    assert_eq!(ingest["data"]["accepted"], 2);
    assert_eq!(ingest["data"]["record_count"], 2);
    assert_eq!(ingest["data"]["skipped_records"], 0);

    let graph = app.get_json("/api/workspaces/lab/graph").await?;
    let nodes = graph["data"]["nodes"].as_array().unwrap();
    let edges = graph["data"]["edges"].as_array().unwrap();

    // agent + source hop + two alternative middle hops + destination.
    assert_eq!(nodes.len(), 5);
    assert_eq!(edges.len(), 5);

    let ids: Vec<&str> = nodes.iter().map(|n| n["id"].as_str().unwrap()).collect();
    assert!(ids.contains(&"agent:berlin"));
    assert!(ids.contains(&"192.168.1.1"));
    assert!(ids.contains(&"192.168.1.2"));

    let dest = nodes
        .iter()
        .find(|n| n["id"] == "8.8.8.8")
        .expect("destination node");
    assert_eq!(dest["kind"], "destination");
    assert_eq!(dest["sample_count"], 2);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_ingest_accumulates_across_batches() -> Result<()> {
    let app = app();
    let records = fixtures::steady_stream();

    app.post_json(
        "/api/workspaces/lab/records",
        json!({ "records": [records[0]] }),
    )
    .await?;
    let second = app
        .post_json(
            "/api/workspaces/lab/records",
            json!({ "records": [records[1], records[2]] }),
        )
        .await?;

    assert_eq!(second["data"]["record_count"], 3);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_ingest_buffer_stays_within_record_cap() -> Result<()> {
    let mut config = Config::default();
    config.ingest.max_records = 2;
    let app = TestApp::new(config);
    let records = fixtures::steady_stream();

    // One record per batch; the retained window must never outgrow the cap.
    let mut last = serde_json::Value::Null;
    for record in &records {
        last = app
            .post_json("/api/workspaces/lab/records", json!({ "records": [record] }))
            .await?;
    }

    assert_eq!(last["data"]["accepted"], 1);
    assert_eq!(last["data"]["record_count"], 2);

    let status = app.get_json("/status").await?;
    assert_eq!(status["data"]["workspaces"]["lab"]["record_count"], 2);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_unreached_target_is_isolated_destination() -> Result<()> {
    let app = app();
    app.post_json(
        "/api/workspaces/lab/records",
        json!({ "records": fixtures::truncated_stream() }),
    )
    .await?;

    let graph = app.get_json("/api/workspaces/lab/graph").await?;
    let nodes = graph["data"]["nodes"].as_array().unwrap();
    let edges = graph["data"]["edges"].as_array().unwrap();

    let dest = nodes
        .iter()
        .find(|n| n["id"] == "9.9.9.9")
        .expect("destination node");
    assert_eq!(dest["kind"], "destination");

    // No edge was synthesized into the unreached destination.
    assert!(edges.iter().all(|e| e["target"] != "9.9.9.9"));
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_graph_missing_workspace_is_404() -> Result<()> {
    let app = app();
    let (status, body) = app.get_with_status("/api/workspaces/nope/graph").await?;
    assert_eq!(status.as_u16(), 404);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "workspace not found: nope");
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_ingest_malformed_batch_rejected() -> Result<()> {
    let app = app();
    let (status, _) = app
        .post_with_status("/api/workspaces/lab/records", json!({ "records": 42 }))
        .await?;
    assert!(status.is_client_error());

    // The failed batch must not have created the workspace.
    let (status, _) = app.get_with_status("/api/workspaces/lab/graph").await?;
    assert_eq!(status.as_u16(), 404);
    Ok(())
}

// ─── Route groups ───────────────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_routes_grouped_and_ranked() -> Result<()> {
    let app = app();
    app.post_json(
        "/api/workspaces/lab/records",
        json!({ "records": fixtures::route_change_stream() }),
    )
    .await?;

    let routes = app.get_json("/api/workspaces/lab/routes?order=summary").await?;
    let groups = routes["data"]["groups"].as_array().unwrap();
    assert_eq!(groups.len(), 2);

    // The changed group ranks above the stable one.
    assert_eq!(groups[0]["route_changed"], true);
    assert!(groups[0]["signature"]
        .as_str()
        .unwrap()
        .contains("192.168.1.2"));
    assert_eq!(groups[1]["route_changed"], false);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_routes_stable_stream_is_one_group() -> Result<()> {
    let app = app();
    app.post_json(
        "/api/workspaces/lab/records",
        json!({ "records": fixtures::steady_stream() }),
    )
    .await?;

    let routes = app.get_json("/api/workspaces/lab/routes").await?;
    let groups = routes["data"]["groups"].as_array().unwrap();
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0]["trace_count"], 3);
    assert_eq!(groups[0]["route_changed"], false);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_routes_lossy_group_flagged() -> Result<()> {
    let app = app();
    app.post_json(
        "/api/workspaces/lab/records",
        json!({ "records": fixtures::lossy_stream() }),
    )
    .await?;

    let routes = app.get_json("/api/workspaces/lab/routes").await?;
    let groups = routes["data"]["groups"].as_array().unwrap();
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0]["has_issue"], true);
    assert_eq!(groups[0]["flagged"], false);
    assert_eq!(groups[0]["max_loss_pct"], 60.0);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_routes_unknown_order_is_400() -> Result<()> {
    let app = app();
    app.post_json(
        "/api/workspaces/lab/records",
        json!({ "records": fixtures::steady_stream() }),
    )
    .await?;

    let (status, _) = app
        .get_with_status("/api/workspaces/lab/routes?order=sideways")
        .await?;
    assert_eq!(status.as_u16(), 400);
    Ok(())
}

// ─── Change detection ───────────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_changes_for_agent() -> Result<()> {
    let app = app();
    app.post_json(
        "/api/workspaces/lab/records",
        json!({ "records": fixtures::route_change_stream() }),
    )
    .await?;

    let changes = app
        .get_json("/api/workspaces/lab/changes/berlin")
        .await?;
    let data = &changes["data"];
    assert_eq!(data["agent"], "berlin");
    assert_eq!(data["record_count"], 2);
    assert_eq!(data["change_count"], 1);

    let deltas = data["changes"][0]["deltas"].as_array().unwrap();
    let removed = deltas
        .iter()
        .find(|d| d["change"] == "removed")
        .expect("removed delta");
    assert_eq!(removed["identifier"], "192.168.1.1");
    let added = deltas
        .iter()
        .find(|d| d["change"] == "added")
        .expect("added delta");
    assert_eq!(added["identifier"], "192.168.1.2");
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_changes_unknown_agent_is_404() -> Result<()> {
    let app = app();
    app.post_json(
        "/api/workspaces/lab/records",
        json!({ "records": fixtures::steady_stream() }),
    )
    .await?;

    let (status, _) = app
        .get_with_status("/api/workspaces/lab/changes/madrid")
        .await?;
    assert_eq!(status.as_u16(), 404);
    Ok(())
}

// ─── Layout ─────────────────────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_hierarchical_layout_pins_everything() -> Result<()> {
    let app = app();
    app.post_json(
        "/api/workspaces/lab/records",
        json!({ "records": fixtures::steady_stream() }),
    )
    .await?;

    let layout = app
        .get_json("/api/workspaces/lab/layout?mode=hierarchical")
        .await?;
    assert_eq!(layout["data"]["mode"], "hierarchical");

    let positions = layout["data"]["positions"].as_object().unwrap();
    assert_eq!(positions.len(), 4);
    assert!(positions.values().all(|p| p["pinned"] == true));

    // Destination sits on the rightmost layer.
    let agent_x = positions["agent:berlin"]["x"].as_f64().unwrap();
    let dest_x = positions["8.8.8.8"]["x"].as_f64().unwrap();
    assert!(dest_x > agent_x);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_force_layout_frees_intermediate_hops() -> Result<()> {
    let app = app();
    app.post_json(
        "/api/workspaces/lab/records",
        json!({ "records": fixtures::steady_stream() }),
    )
    .await?;

    let layout = app
        .get_json("/api/workspaces/lab/layout?mode=force")
        .await?;
    assert_eq!(layout["data"]["mode"], "force");

    let positions = layout["data"]["positions"].as_object().unwrap();
    assert_eq!(positions["agent:berlin"]["pinned"], true);
    assert_eq!(positions["8.8.8.8"]["pinned"], true);
    assert_eq!(positions["192.168.1.1"]["pinned"], false);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_layout_unknown_mode_is_400() -> Result<()> {
    let app = app();
    app.post_json(
        "/api/workspaces/lab/records",
        json!({ "records": fixtures::steady_stream() }),
    )
    .await?;

    let (status, _) = app
        .get_with_status("/api/workspaces/lab/layout?mode=circular")
        .await?;
    assert_eq!(status.as_u16(), 400);
    Ok(())
}

// ─── Node selection ─────────────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_node_selection_detail() -> Result<()> {
    let app = app();
    app.post_json(
        "/api/workspaces/lab/records",
        json!({ "records": fixtures::steady_stream() }),
    )
    .await?;

    let detail = app
        .get_json("/api/workspaces/lab/nodes/192.168.1.1")
        .await?;
    let data = &detail["data"];
    assert_eq!(data["node"]["id"], "192.168.1.1");
    assert_eq!(data["node"]["kind"], "hop");
    assert!(data["position"].is_object());
    assert_eq!(data["highlight"]["path_ids"].as_array().unwrap().len(), 3);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_node_selection_missing_is_404() -> Result<()> {
    let app = app();
    app.post_json(
        "/api/workspaces/lab/records",
        json!({ "records": fixtures::steady_stream() }),
    )
    .await?;

    let (status, body) = app
        .get_with_status("/api/workspaces/lab/nodes/203.0.113.7")
        .await?;
    assert_eq!(status.as_u16(), 404);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "node not found: 203.0.113.7");
    Ok(())
}

// ─── Workspace isolation ────────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_workspaces_are_isolated() -> Result<()> {
    let app = app();
    app.post_json(
        "/api/workspaces/alpha/records",
        json!({ "records": fixtures::steady_stream() }),
    )
    .await?;
    app.post_json(
        "/api/workspaces/beta/records",
        json!({ "records": fixtures::lossy_stream() }),
    )
    .await?;

    let alpha = app.get_json("/api/workspaces/alpha/graph").await?;
    let beta = app.get_json("/api/workspaces/beta/graph").await?;

    let alpha_ids: Vec<&str> = alpha["data"]["nodes"]
        .as_array()
        .unwrap()
        .iter()
        .map(|n| n["id"].as_str().unwrap())
        .collect();
    assert!(alpha_ids.contains(&"8.8.8.8"));
    assert!(!alpha_ids.contains(&"1.1.1.1"));

    let beta_ids: Vec<&str> = beta["data"]["nodes"]
        .as_array()
        .unwrap()
        .iter()
        .map(|n| n["id"].as_str().unwrap())
        .collect();
    assert!(beta_ids.contains(&"1.1.1.1"));
    assert!(!beta_ids.contains(&"agent:berlin"));
    Ok(())
}
