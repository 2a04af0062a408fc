// Integration tests for the classroom protocol
// Connections are simulated with in-process channels; every frame goes
// through the same handler the WebSocket loop uses.

use classroom_sync::config::ServerConfig;
use classroom_sync::core::{handle_message, teardown, ConnectionContext, ServerManager};
use classroom_sync::storage::MemoryStore;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::mpsc;
use warp::ws::Message;

const SECRET: &str = "test-admin-secret";

struct TestClient {
    context: ConnectionContext,
    rx: mpsc::UnboundedReceiver<Message>,
}

impl TestClient {
    async fn connect(server: &ServerManager) -> Self {
        let context = ConnectionContext::new();
        let (tx, rx) = mpsc::unbounded_channel();
        server.register_connection(context.id.clone(), tx).await;
        Self { context, rx }
    }

    async fn emit(&mut self, server: &ServerManager, event: &str, args: Value) {
        let frame = json!({ "event": event, "args": args }).to_string();
        handle_message(server, &mut self.context, &frame).await;
    }

    /// Every frame received so far
    fn drain(&mut self) -> Vec<Value> {
        let mut frames = Vec::new();
        while let Ok(message) = self.rx.try_recv() {
            if let Ok(text) = message.to_str() {
                frames.push(serde_json::from_str(text).unwrap());
            }
        }
        frames
    }

    fn events(&mut self) -> Vec<String> {
        self.drain()
            .iter()
            .map(|frame| frame["event"].as_str().unwrap_or_default().to_string())
            .collect()
    }
}

fn new_server() -> Arc<ServerManager> {
    Arc::new(ServerManager::new(
        ServerConfig::for_testing(),
        Arc::new(MemoryStore::new()),
    ))
}

/// Create a class from an admin console and return its handle
async fn create_class(server: &ServerManager, admin: &mut TestClient, groups: u32) -> String {
    admin
        .emit(server, "add-class", json!(["Physics", groups, SECRET, 1]))
        .await;
    let frames = admin.drain();
    assert_eq!(frames[0]["event"], "add-class-response");
    frames[0]["data"]["class_id"].as_str().unwrap().to_string()
}

async fn login_to_group(
    server: &ServerManager,
    client: &mut TestClient,
    username: &str,
    handle: &str,
    group_id: u32,
) {
    client.emit(server, "login", json!([username, handle])).await;
    client.emit(server, "groups_get", json!([username, handle])).await;
    client
        .emit(server, "group_join", json!([username, handle, group_id]))
        .await;
    client.drain();
}

#[tokio::test]
async fn test_double_login_is_name_taken() {
    let server = new_server();
    let mut admin = TestClient::connect(&server).await;
    let handle = create_class(&server, &mut admin, 2).await;

    let mut first = TestClient::connect(&server).await;
    let mut second = TestClient::connect(&server).await;

    first.emit(&server, "login", json!(["alice", handle])).await;
    assert_eq!(first.events(), vec!["login_response"]);

    second.emit(&server, "login", json!(["alice", handle])).await;
    let frames = second.drain();
    assert_eq!(frames[0]["event"], "server_error");
    assert_eq!(frames[0]["data"]["message"], "Username alice is already taken.");
}

#[tokio::test]
async fn test_repeated_login_on_one_connection_is_name_taken() {
    let server = new_server();
    let mut admin = TestClient::connect(&server).await;
    let handle = create_class(&server, &mut admin, 1).await;

    let mut client = TestClient::connect(&server).await;
    client.emit(&server, "login", json!(["alice", handle])).await;
    assert_eq!(client.events(), vec!["login_response"]);

    client.emit(&server, "login", json!(["alice", handle])).await;
    let frames = client.drain();
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0]["event"], "server_error");
    assert_eq!(frames[0]["data"]["message"], "Username alice is already taken.");
}

#[tokio::test]
async fn test_empty_username_rejected_for_any_handle() {
    let server = new_server();
    let mut client = TestClient::connect(&server).await;

    for handle in ["", "ab12cd34", "whatever"] {
        client.emit(&server, "login", json!(["", handle])).await;
        let frames = client.drain();
        assert_eq!(frames[0]["event"], "server_error");
        assert_eq!(frames[0]["data"]["message"], "Invalid username.");
    }
}

#[tokio::test]
async fn test_rejoining_group_starts_from_origin() {
    let server = new_server();
    let mut admin = TestClient::connect(&server).await;
    let handle = create_class(&server, &mut admin, 1).await;

    let mut bob = TestClient::connect(&server).await;
    login_to_group(&server, &mut bob, "bob", &handle, 1).await;

    bob.emit(
        &server,
        "coordinate_change",
        json!(["bob", handle, 1, {"mood": "ok"}, {"x": 5, "y": 5}]),
    )
    .await;
    bob.emit(&server, "group_leave", json!(["bob", handle, 1])).await;
    bob.emit(&server, "group_join", json!(["bob", handle, 1])).await;

    let frames = bob.drain();
    let join = frames
        .iter()
        .rev()
        .find(|f| f["event"] == "group_join_response")
        .expect("group_join_response");
    assert_eq!(join["data"]["other_members"][0]["position"], json!({"x": 0.0, "y": 0.0}));
    assert_eq!(join["data"]["other_members"][0]["member_info"], json!({}));
}

#[tokio::test]
async fn test_deltas_accumulate() {
    let server = new_server();
    let mut admin = TestClient::connect(&server).await;
    let handle = create_class(&server, &mut admin, 1).await;

    let mut carol = TestClient::connect(&server).await;
    login_to_group(&server, &mut carol, "carol", &handle, 1).await;

    carol
        .emit(&server, "coordinate_change", json!(["carol", handle, 1, {}, [3, -2]]))
        .await;
    carol
        .emit(&server, "coordinate_change", json!(["carol", handle, 1, {}, {"x": 1, "y": 1}]))
        .await;

    let frames = carol.drain();
    let last = frames
        .iter()
        .rev()
        .find(|f| f["event"] == "coordinate_change_response")
        .expect("coordinate_change_response");
    assert_eq!(last["data"]["position"], json!({"x": 4.0, "y": -1.0}));
}

#[tokio::test]
async fn test_non_numeric_delta_is_invalid_input() {
    let server = new_server();
    let mut admin = TestClient::connect(&server).await;
    let handle = create_class(&server, &mut admin, 1).await;

    let mut dan = TestClient::connect(&server).await;
    login_to_group(&server, &mut dan, "dan", &handle, 1).await;

    dan.emit(&server, "coordinate_change", json!(["dan", handle, 1, {}, {"x": "far"}]))
        .await;
    assert_eq!(dan.events(), vec!["server_error"]);
}

#[tokio::test]
async fn test_group_events_reach_class_and_admin_rooms() {
    let server = new_server();
    let mut admin = TestClient::connect(&server).await;
    let handle = create_class(&server, &mut admin, 2).await;

    let mut watcher = TestClient::connect(&server).await;
    watcher.emit(&server, "login", json!(["watcher", handle])).await;
    watcher.emit(&server, "groups_get", json!(["watcher", handle])).await;
    watcher.drain();

    let mut alice = TestClient::connect(&server).await;
    alice.emit(&server, "login", json!(["alice", handle])).await;
    alice.emit(&server, "group_join", json!(["alice", handle, 2])).await;

    assert_eq!(alice.events(), vec!["login_response", "group_join_response"]);
    assert_eq!(watcher.events(), vec!["group_numbers_response"]);
    assert_eq!(admin.events(), vec!["group_info_response"]);
}

#[tokio::test]
async fn test_xml_change_skips_sender() {
    let server = new_server();
    let mut admin = TestClient::connect(&server).await;
    let handle = create_class(&server, &mut admin, 1).await;

    let mut alice = TestClient::connect(&server).await;
    let mut bob = TestClient::connect(&server).await;
    login_to_group(&server, &mut alice, "alice", &handle, 1).await;
    login_to_group(&server, &mut bob, "bob", &handle, 1).await;
    alice.drain();
    admin.drain();

    alice
        .emit(&server, "xml_change", json!(["alice", handle, 1, "<xml/>", {"tools": []}]))
        .await;

    assert!(alice.events().is_empty());
    let frames = bob.drain();
    assert_eq!(frames[0]["event"], "xml_change_response");
    assert_eq!(frames[0]["data"]["xml"], "&lt;xml/&gt;");
    assert_eq!(admin.events(), vec!["xml_change_response"]);

    // The console edits as "admin" without logging in
    admin.emit(&server, "get_xml", json!(["admin", handle, 1])).await;
    let frames = admin.drain();
    assert_eq!(frames[0]["event"], "get_xml_response");
    assert_eq!(frames[0]["data"]["xml"], "&lt;xml/&gt;");
}

#[tokio::test]
async fn test_delete_group_sends_one_notice() {
    let server = new_server();
    let mut admin = TestClient::connect(&server).await;
    let handle = create_class(&server, &mut admin, 2).await;

    let mut members = Vec::new();
    for name in ["a", "b", "c"] {
        let mut client = TestClient::connect(&server).await;
        login_to_group(&server, &mut client, name, &handle, 2).await;
        members.push(client);
    }
    for member in members.iter_mut() {
        member.drain();
    }
    admin.drain();

    admin
        .emit(&server, "delete-group", json!([handle, 2, SECRET]))
        .await;
    assert_eq!(admin.events()[0], "delete-group-response");

    for member in members.iter_mut() {
        let events = member.events();
        let notices = events.iter().filter(|e| *e == "group_leave_response").count();
        assert_eq!(notices, 1);
    }

    // Bindings are stale, but leaving still reports cleanly
    members[0].emit(&server, "group_leave", json!(["a", handle, 2])).await;
    assert_eq!(members[0].events(), vec!["server_error"]);
    members[0].emit(&server, "group_join", json!(["a", handle, 1])).await;
    assert_eq!(members[0].events()[0], "group_join_response");
}

#[tokio::test]
async fn test_recreated_group_isolated_from_former_members() {
    let server = new_server();
    let mut admin = TestClient::connect(&server).await;
    let handle = create_class(&server, &mut admin, 2).await;

    let mut a = TestClient::connect(&server).await;
    login_to_group(&server, &mut a, "a", &handle, 2).await;
    admin.drain();

    admin
        .emit(&server, "delete-group", json!([handle, 2, SECRET]))
        .await;
    admin.emit(&server, "add-group", json!([handle, SECRET])).await;
    let frames = admin.drain();
    let added = frames
        .iter()
        .find(|f| f["event"] == "add-group-response")
        .expect("add-group-response");
    assert!(added["data"]["groups"]
        .as_array()
        .unwrap()
        .iter()
        .any(|g| g["grp_name"] == 2));

    let mut b = TestClient::connect(&server).await;
    login_to_group(&server, &mut b, "b", &handle, 2).await;
    a.drain();

    b.emit(&server, "coordinate_change", json!(["b", handle, 2, {}, [1, 1]]))
        .await;
    assert_eq!(b.events(), vec!["coordinate_change_response"]);
    assert!(!a.events().iter().any(|e| e == "coordinate_change_response"));

    // Leaving the recreated group fails but releases the old binding
    a.emit(&server, "group_leave", json!(["a", handle, 2])).await;
    let frames = a.drain();
    assert_eq!(frames[0]["event"], "server_error");
    assert_eq!(
        frames[0]["data"]["message"],
        "Username a is not a member of this group."
    );

    a.emit(&server, "group_join", json!(["a", handle, 1])).await;
    assert_eq!(a.events()[0], "group_join_response");
}

#[tokio::test]
async fn test_admin_ops_on_unknown_handle() {
    let server = new_server();
    let mut admin = TestClient::connect(&server).await;

    let requests = [
        ("join-class", json!(["ab12cd34", SECRET])),
        ("add-group", json!(["ab12cd34", SECRET])),
        ("delete-group", json!(["ab12cd34", 1, SECRET])),
        ("delete-class", json!(["ab12cd34", SECRET])),
        ("save-settings", json!(["ab12cd34", {}, SECRET])),
    ];
    for (event, args) in requests {
        admin.emit(&server, event, args).await;
        let frames = admin.drain();
        assert_eq!(frames.len(), 1, "{} should answer once", event);
        assert_eq!(frames[0]["event"], "server_error");
        assert_eq!(frames[0]["data"]["message"], "Class ID ab12cd34 is invalid.");
    }
}

#[tokio::test]
async fn test_wrong_secret_is_silent() {
    let server = new_server();
    let mut admin = TestClient::connect(&server).await;
    let handle = create_class(&server, &mut admin, 1).await;

    admin.emit(&server, "add-group", json!([handle, "nope"])).await;
    admin.emit(&server, "delete-class", json!([handle, "nope"])).await;
    assert!(admin.drain().is_empty());
    assert!(server.registry().contains(&handle).unwrap());
}

#[tokio::test]
async fn test_concurrent_logins_one_winner() {
    let server = new_server();
    let mut admin = TestClient::connect(&server).await;
    let handle = create_class(&server, &mut admin, 1).await;

    let mut tasks = Vec::new();
    for _ in 0..2 {
        let server = server.clone();
        let handle = handle.clone();
        tasks.push(tokio::spawn(async move {
            let mut client = TestClient::connect(&server).await;
            client.emit(&server, "login", json!(["alice", handle])).await;
            client.events()
        }));
    }

    let mut results = Vec::new();
    for task in tasks {
        results.push(task.await.unwrap());
    }
    let wins = results.iter().filter(|e| e[0] == "login_response").count();
    let losses = results.iter().filter(|e| e[0] == "server_error").count();
    assert_eq!((wins, losses), (1, 1));
}

#[tokio::test]
async fn test_disconnect_in_group_cascades_once() {
    let server = new_server();
    let mut admin = TestClient::connect(&server).await;
    let handle = create_class(&server, &mut admin, 1).await;

    let mut alice = TestClient::connect(&server).await;
    let mut bob = TestClient::connect(&server).await;
    login_to_group(&server, &mut alice, "alice", &handle, 1).await;
    login_to_group(&server, &mut bob, "bob", &handle, 1).await;
    alice.drain();
    admin.drain();

    teardown(&server, &mut bob.context).await;

    let peer = alice.drain();
    let infos: Vec<&Value> = peer
        .iter()
        .filter(|f| f["event"] == "group_info_response")
        .collect();
    assert_eq!(infos.len(), 1);
    assert_eq!(infos[0]["data"]["disconnect"], true);
    assert_eq!(infos[0]["data"]["username"], "bob");
    assert!(!peer.iter().any(|f| f["event"] == "logout_response"));

    let own = bob.events();
    assert_eq!(own.last().map(String::as_str), Some("logout_response"));

    teardown(&server, &mut bob.context).await;
    assert!(alice.drain().is_empty());
    assert!(admin.drain().is_empty());

    // The name is free again
    let mut again = TestClient::connect(&server).await;
    again.emit(&server, "login", json!(["bob", handle])).await;
    assert_eq!(again.events(), vec!["login_response"]);
}

#[tokio::test]
async fn test_logout_while_in_group_leaves_group_first() {
    let server = new_server();
    let mut admin = TestClient::connect(&server).await;
    let handle = create_class(&server, &mut admin, 1).await;

    let mut alice = TestClient::connect(&server).await;
    login_to_group(&server, &mut alice, "alice", &handle, 1).await;

    alice.emit(&server, "logout", json!(["alice", handle])).await;
    assert_eq!(
        alice.events(),
        vec!["group_leave_response", "logout_response"]
    );
}

#[tokio::test]
async fn test_delete_class_cascade() {
    let server = new_server();
    let mut admin = TestClient::connect(&server).await;
    let handle = create_class(&server, &mut admin, 2).await;

    let mut alice = TestClient::connect(&server).await;
    login_to_group(&server, &mut alice, "alice", &handle, 1).await;
    let mut bystander = TestClient::connect(&server).await;
    admin.drain();

    admin
        .emit(&server, "delete-class", json!([handle, SECRET, false]))
        .await;

    assert_eq!(
        alice.events(),
        vec![
            "group_leave_response",
            "logout_response",
            "delete-student-class-response",
            "logout_response",
        ]
    );
    assert_eq!(
        admin.events(),
        vec![
            "leave-class-response",
            "delete-class-response",
            "delete-student-class-response",
        ]
    );
    assert_eq!(bystander.events(), vec!["delete-student-class-response"]);
    assert!(!server.registry().contains(&handle).unwrap());
    assert!(server.identity().resolve(&handle).is_err());

    // A stale binding to a deleted class does not block a new login
    let mut admin2 = TestClient::connect(&server).await;
    let other = create_class(&server, &mut admin2, 1).await;
    alice.emit(&server, "login", json!(["alice", other])).await;
    assert_eq!(alice.events(), vec!["login_response"]);
}

#[tokio::test]
async fn test_admin_join_replays_group_rosters() {
    let server = new_server();
    let mut admin = TestClient::connect(&server).await;
    let handle = create_class(&server, &mut admin, 3).await;

    let mut alice = TestClient::connect(&server).await;
    let mut bob = TestClient::connect(&server).await;
    login_to_group(&server, &mut alice, "alice", &handle, 1).await;
    login_to_group(&server, &mut bob, "bob", &handle, 3).await;

    let mut console = TestClient::connect(&server).await;
    console.emit(&server, "join-class", json!([handle, SECRET])).await;

    let frames = console.drain();
    assert_eq!(frames[0]["event"], "add-class-response");
    assert_eq!(frames[0]["data"]["group_count"], 3);
    let groups: Vec<u64> = frames[1..]
        .iter()
        .filter(|f| f["event"] == "group_info_response")
        .map(|f| f["data"]["group_id"].as_u64().unwrap())
        .collect();
    assert_eq!(groups, vec![1, 3]);
}

#[tokio::test]
async fn test_settings_and_toolbars() {
    let server = new_server();
    let mut admin = TestClient::connect(&server).await;
    let handle = create_class(&server, &mut admin, 1).await;

    let mut alice = TestClient::connect(&server).await;
    login_to_group(&server, &mut alice, "alice", &handle, 1).await;
    admin.drain();

    admin
        .emit(&server, "save-settings", json!([handle, {"grid": true}, SECRET]))
        .await;
    let frames = alice.drain();
    assert_eq!(frames[0]["event"], "get-settings-response");
    assert_eq!(frames[0]["data"]["settings"], json!({"grid": true}));

    admin
        .emit(&server, "save-toolbar", json!([handle, "basic", ["pen"], SECRET]))
        .await;
    let frames = admin.drain();
    // Once to the socket, once through the admin room it belongs to
    assert_eq!(frames.len(), 2);
    assert_eq!(frames[0]["data"]["toolbars"][0]["toolbar_name"], "basic");

    admin
        .emit(&server, "delete-toolbar", json!([handle, "basic", SECRET]))
        .await;
    let frames = admin.drain();
    assert_eq!(frames[0]["event"], "delete-toolbar-response");
    assert_eq!(frames[0]["data"]["toolbars"], json!([]));
}

#[tokio::test]
async fn test_admin_account_flow() {
    let server = new_server();
    let mut console = TestClient::connect(&server).await;

    console
        .emit(&server, "create-admin", json!(["prof", "hunter2", SECRET]))
        .await;
    let frames = console.drain();
    assert_eq!(frames[0]["data"]["check"], 1);
    let admin_id = frames[0]["data"]["admin_id"].as_u64().unwrap();

    console
        .emit(&server, "check-username", json!(["prof", "hunter2", SECRET]))
        .await;
    let frames = console.drain();
    assert_eq!(frames[0]["event"], "check-username-response");
    assert_eq!(frames[0]["data"]["check"], 1);

    console
        .emit(&server, "create-session", json!([admin_id, "tok"]))
        .await;
    assert!(console.drain().is_empty());

    console
        .emit(&server, "check-session", json!([admin_id, "tok"]))
        .await;
    let frames = console.drain();
    assert_eq!(frames[0]["data"]["check"], 1);
    assert_eq!(frames[0]["data"]["admin_id"], admin_id);

    console
        .emit(&server, "get-classes", json!([SECRET, admin_id]))
        .await;
    let frames = console.drain();
    assert_eq!(frames[0]["event"], "get-classes-response");
    assert_eq!(frames[0]["data"]["classes"], json!([]));
}
