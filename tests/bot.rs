use std::sync::Arc;

use async_trait::async_trait;
use httpmock::Method::{GET, POST};
use httpmock::MockServer;
use serde_json::{json, Value};
use tokio::sync::Mutex;

use boxdesk::bot::discord::{Attachment, ChatPlatform, DiscordClient, DiscordMessage, DiscordUser};
use boxdesk::bot::feed::{FeedWatcher, SeenStore};
use boxdesk::bot::handler::{
    MessageHandler, API_ERROR, EMPTY_QUESTION, FILE_RECEIVED, SERVICE_UNAVAILABLE,
};
use boxdesk::bot::monitor::AlertNotifier;
use boxdesk::client::ApiClient;
use boxdesk::error::{BoxdeskError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Sent {
    Send(String, String),
    Reply(String, String, String),
}

#[derive(Default)]
struct FakePlatform {
    sent: Mutex<Vec<Sent>>,
    history: Vec<DiscordMessage>,
    fail_channel: bool,
}

impl FakePlatform {
    async fn sent(&self) -> Vec<Sent> {
        self.sent.lock().await.clone()
    }
}

#[async_trait]
impl ChatPlatform for FakePlatform {
    async fn send(&self, channel_id: &str, content: &str) -> Result<()> {
        if self.fail_channel && channel_id == "alerts" {
            return Err(BoxdeskError::Upstream("missing access".to_string()));
        }
        self.sent
            .lock()
            .await
            .push(Sent::Send(channel_id.to_string(), content.to_string()));
        Ok(())
    }

    async fn reply(&self, channel_id: &str, message_id: &str, content: &str) -> Result<()> {
        self.sent.lock().await.push(Sent::Reply(
            channel_id.to_string(),
            message_id.to_string(),
            content.to_string(),
        ));
        Ok(())
    }

    async fn typing(&self, _channel_id: &str) -> Result<()> {
        Ok(())
    }

    async fn recent_messages(&self, _channel_id: &str, _limit: u8) -> Result<Vec<DiscordMessage>> {
        Ok(self.history.clone())
    }

    async fn open_dm(&self, user_id: &str) -> Result<String> {
        Ok(format!("dm-{user_id}"))
    }

    async fn download(&self, _url: &str) -> Result<Vec<u8>> {
        Ok(b"file".to_vec())
    }
}

fn user(id: &str, name: &str) -> DiscordUser {
    DiscordUser {
        id: id.to_string(),
        username: name.to_string(),
        global_name: None,
        bot: id == "bot",
    }
}

fn message(id: &str, author: DiscordUser, content: &str, guild: bool) -> DiscordMessage {
    DiscordMessage {
        id: id.to_string(),
        channel_id: "chan".to_string(),
        guild_id: guild.then(|| "guild".to_string()),
        author,
        content: content.to_string(),
        timestamp: String::new(),
        attachments: Vec::new(),
        mentions: Vec::new(),
    }
}

fn handler(platform: Arc<FakePlatform>, server: &MockServer, always: Vec<String>) -> MessageHandler {
    MessageHandler::new(
        user("bot", "boxdesk"),
        platform,
        ApiClient::new(&server.url("/ask_agent")).unwrap(),
        None,
        always,
    )
}

#[tokio::test]
async fn mentions_are_answered_as_replies_with_history() {
    let server = MockServer::start_async().await;
    let ask = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/ask_agent")
                .json_body_partial(
                    json!({
                        "message": "book tomorrow",
                        "user_id": "u1",
                        "history": [
                            { "role": "user", "content": "earlier", "author": "ana" },
                            { "role": "assistant", "content": "sure", "author": "boxdesk" }
                        ]
                    })
                    .to_string(),
                );
            then.status(200).json_body(json!({ "response": "Booked", "thread_id": "t", "turn_id": "m" }));
        })
        .await;

    let platform = Arc::new(FakePlatform {
        // Newest first, as the platform returns it.
        history: vec![
            message("3", user("bot", "boxdesk"), "sure", true),
            message("2", user("u1", "ana"), "", true),
            message("1", user("u1", "ana"), "earlier", true),
        ],
        ..FakePlatform::default()
    });
    let handler = handler(platform.clone(), &server, Vec::new());

    let incoming = message("10", user("u1", "ana"), "<@bot> book tomorrow", true);
    assert!(handler.should_respond(&incoming));
    handler.handle(&incoming).await.unwrap();

    ask.assert_async().await;
    assert_eq!(
        platform.sent().await,
        vec![Sent::Reply("chan".into(), "10".into(), "Booked".into())]
    );
}

#[tokio::test]
async fn guild_chatter_is_ignored_unless_allow_listed() {
    let server = MockServer::start_async().await;
    let platform = Arc::new(FakePlatform::default());
    let plain = handler(platform.clone(), &server, Vec::new());
    let listed = handler(platform.clone(), &server, vec!["u1".to_string()]);

    let chatter = message("1", user("u1", "ana"), "just talking", true);
    assert!(!plain.should_respond(&chatter));
    assert!(listed.should_respond(&chatter));
    assert!(!plain.should_respond(&message("2", user("bot", "boxdesk"), "<@bot>", true)));
    assert!(plain.should_respond(&message("3", user("u2", "bo"), "hi", false)));

    plain.handle(&chatter).await.unwrap();
    assert!(platform.sent().await.is_empty());
}

#[tokio::test]
async fn direct_messages_get_plain_answers_and_status_texts() {
    let server = MockServer::start_async().await;
    let mut ok = server
        .mock_async(|when, then| {
            when.method(POST).path("/ask_agent").body_contains("\"user_id\":\"u1\"");
            then.status(200).json_body(json!({ "response": "" }));
        })
        .await;

    let platform = Arc::new(FakePlatform::default());
    let handler = handler(platform.clone(), &server, Vec::new());
    handler
        .handle(&message("1", user("u1", "ana"), "hello", false))
        .await
        .unwrap();
    ok.delete_async().await;

    let mut unavailable = server
        .mock_async(|when, then| {
            when.method(POST).path("/ask_agent");
            then.status(503).json_body(json!({ "detail": "db down" }));
        })
        .await;
    handler
        .handle(&message("2", user("u1", "ana"), "hello", false))
        .await
        .unwrap();
    unavailable.delete_async().await;

    server
        .mock_async(|when, then| {
            when.method(POST).path("/ask_agent");
            then.status(500);
        })
        .await;
    handler
        .handle(&message("3", user("u1", "ana"), "hello", false))
        .await
        .unwrap();
    handler
        .handle(&message("4", user("u1", "ana"), "<@bot>  ", true))
        .await
        .unwrap();

    assert_eq!(
        platform.sent().await,
        vec![
            Sent::Send("chan".into(), "No response.".into()),
            Sent::Send("chan".into(), SERVICE_UNAVAILABLE.into()),
            Sent::Send("chan".into(), API_ERROR.into()),
            Sent::Send("chan".into(), EMPTY_QUESTION.into()),
        ]
    );
}

#[tokio::test]
async fn attachments_without_a_vector_store_are_reported() {
    let server = MockServer::start_async().await;
    let platform = Arc::new(FakePlatform::default());
    let handler = handler(platform.clone(), &server, Vec::new());

    let mut incoming = message("1", user("u1", "ana"), "", false);
    incoming.attachments.push(Attachment {
        id: "a".to_string(),
        filename: "rules.pdf".to_string(),
        url: "https://cdn.example/rules.pdf".to_string(),
        size: 4,
    });
    handler.handle(&incoming).await.unwrap();

    let sent = platform.sent().await;
    assert_eq!(sent[0], Sent::Send("chan".into(), FILE_RECEIVED.into()));
    match &sent[1] {
        Sent::Send(_, text) => assert!(text.starts_with("Could not add the file")),
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test]
async fn alerts_fall_back_from_channel_to_dm_to_log() {
    let platform = Arc::new(FakePlatform {
        fail_channel: true,
        ..FakePlatform::default()
    });
    let both = AlertNotifier::new(
        platform.clone(),
        Some("alerts".to_string()),
        Some("99".to_string()),
    );
    assert_eq!(both.deliver("api down").await, "dm");
    assert_eq!(
        platform.sent().await,
        vec![Sent::Send("dm-99".into(), "api down".into())]
    );

    let nowhere = AlertNotifier::new(platform.clone(), None, None);
    assert_eq!(nowhere.deliver("api down").await, "log");

    let healthy = Arc::new(FakePlatform::default());
    let channel = AlertNotifier::new(healthy.clone(), Some("ops".to_string()), None);
    assert_eq!(channel.deliver("recovered").await, "channel");
}

#[tokio::test]
async fn feed_announces_each_post_once() {
    let server = MockServer::start_async().await;
    let listing = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/r/boxing/new.json")
                .query_param("limit", "2");
            then.status(200).json_body(json!({
                "data": { "children": [
                    { "data": { "id": "p2", "title": "Sparring night", "url": "https://r.example/p2" } },
                    { "data": { "id": "p1", "title": "Gloves", "url": "https://r.example/p1" } }
                ]}
            }));
        })
        .await;

    let dir = tempfile::tempdir().unwrap();
    let seen_path = dir.path().join("seen_posts.txt");
    std::fs::write(&seen_path, "p1\n").unwrap();

    let watcher = FeedWatcher::new(&server.base_url(), "boxing", 2).unwrap();
    let mut seen = SeenStore::load(&seen_path).await.unwrap();
    assert!(seen.contains("p1"));

    let platform = FakePlatform::default();
    assert_eq!(watcher.poll_once(&mut seen, &platform, "dm-1").await.unwrap(), 1);
    assert_eq!(watcher.poll_once(&mut seen, &platform, "dm-1").await.unwrap(), 0);
    listing.assert_hits_async(2).await;

    assert_eq!(
        platform.sent().await,
        vec![Sent::Send(
            "dm-1".into(),
            "New post on r/boxing: **Sparring night**\nhttps://r.example/p2".into()
        )]
    );
    let persisted = std::fs::read_to_string(&seen_path).unwrap();
    assert_eq!(persisted, "p1\np2\n");

    let reloaded = SeenStore::load(&seen_path).await.unwrap();
    assert_eq!(reloaded.len(), 2);
    let empty = SeenStore::load(dir.path().join("missing.txt")).await.unwrap();
    assert!(empty.is_empty());
}

#[tokio::test]
async fn discord_client_retries_rate_limits_and_splits_long_messages() {
    let server = MockServer::start_async().await;
    let mut limited = server
        .mock_async(|when, then| {
            when.method(GET).path("/users/@me");
            then.status(429).json_body(json!({ "retry_after": 0.01, "global": false }));
        })
        .await;
    let client = DiscordClient::new("tok", server.base_url())
        .unwrap()
        .with_max_retries(1);
    let err = client.current_user().await.unwrap_err();
    assert!(matches!(err, BoxdeskError::Upstream(_)));
    limited.assert_hits_async(2).await;
    limited.delete_async().await;

    let me = server
        .mock_async(|when, then| {
            when.method(GET).path("/users/@me").header("authorization", "Bot tok");
            then.status(200).json_body(json!({ "id": "bot", "username": "boxdesk", "bot": true }));
        })
        .await;
    assert!(client.current_user().await.unwrap().bot);
    me.assert_async().await;

    let posts = server
        .mock_async(|when, then| {
            when.method(POST).path("/channels/c1/messages");
            then.status(200).json_body(json!({
                "id": "m", "channel_id": "c1", "author": { "id": "bot" }, "content": "x"
            }));
        })
        .await;
    let long: String = "a".repeat(2500);
    client.send("c1", &long).await.unwrap();
    posts.assert_hits_async(2).await;

    let reply = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/channels/c2/messages")
                .body_contains("\"message_id\":\"m9\"");
            then.status(200).json_body(json!({
                "id": "m", "channel_id": "c2", "author": { "id": "bot" }, "content": "x"
            }));
        })
        .await;
    client.reply("c2", "m9", "pong").await.unwrap();
    reply.assert_async().await;

    let dm = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/users/@me/channels")
                .json_body(json!({ "recipient_id": "42" }));
            then.status(200).json_body(json!({ "id": "dm-chan", "type": 1 }));
        })
        .await;
    assert_eq!(client.open_dm("42").await.unwrap(), "dm-chan");
    dm.assert_async().await;
}

#[test]
fn history_is_oldest_first_with_roles() {
    let server_url = "http://localhost:1/ask_agent";
    let handler = MessageHandler::new(
        user("bot", "boxdesk"),
        Arc::new(FakePlatform::default()),
        ApiClient::new(server_url).unwrap(),
        None,
        Vec::<String>::new(),
    );
    let history = handler.history(vec![
        message("2", user("bot", "boxdesk"), "answer", true),
        message("1", user("u1", "ana"), "question", true),
    ]);
    let roles: Vec<Value> = history
        .iter()
        .map(|h| json!([h.role, h.content, h.author]))
        .collect();
    assert_eq!(
        roles,
        vec![
            json!(["user", "question", "ana"]),
            json!(["assistant", "answer", "boxdesk"]),
        ]
    );
    assert_eq!(
        handler.question(&message("3", user("u1", "ana"), "<@!bot> hi there ", true)),
        "hi there"
    );
}
