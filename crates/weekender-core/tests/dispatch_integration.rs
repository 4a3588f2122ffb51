//! End-to-end tests for the dispatch loop.
//!
//! Most tests drive a `Dispatcher` over an in-memory fake MCP server so every
//! write can be counted; the last ones run a real `bash` child process.

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use serde_json::{Value, json};
use weekender_core::{Dispatcher, HELP_ANSWER, JsonDecider, KeywordDecider, Turn};
use weekender_mcp::channel::ChannelFuture;
use weekender_mcp::{
    Channel, Connection, ServerConfig, Session, SessionOptions, SessionState, TransportError,
};
use weekender_types::Conversation;

// ---------------------------------------------------------------------------
// FakeServer
// ---------------------------------------------------------------------------

/// What a fake tool does when called.
#[derive(Clone)]
enum Behavior {
    Text(&'static str),
    /// The server dies without answering.
    Hangup,
}

#[derive(Default)]
struct Recorder {
    writes: AtomicUsize,
    closes: AtomicUsize,
    calls: Mutex<Vec<(String, Value)>>,
}

impl Recorder {
    fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

/// In-memory MCP server speaking just enough of the protocol.
struct FakeServer {
    tools: Vec<(&'static str, Behavior)>,
    inbox: VecDeque<String>,
    dead: bool,
    recorder: Arc<Recorder>,
}

impl FakeServer {
    fn new(tools: Vec<(&'static str, Behavior)>) -> (Self, Arc<Recorder>) {
        let recorder = Arc::new(Recorder::default());
        let server = Self {
            tools,
            inbox: VecDeque::new(),
            dead: false,
            recorder: Arc::clone(&recorder),
        };
        (server, recorder)
    }

    fn respond(&mut self, id: u64, result: Value) {
        self.inbox
            .push_back(json!({"jsonrpc": "2.0", "id": id, "result": result}).to_string());
    }
}

impl Channel for FakeServer {
    fn send(&mut self, message: String) -> ChannelFuture<'_, ()> {
        Box::pin(async move {
            if self.dead {
                return Err(TransportError::Closed);
            }
            self.recorder.writes.fetch_add(1, Ordering::SeqCst);

            let msg: Value = serde_json::from_str(&message).unwrap();
            let Some(id) = msg.get("id").and_then(Value::as_u64) else {
                return Ok(());
            };
            match msg["method"].as_str().unwrap() {
                "initialize" => self.respond(
                    id,
                    json!({
                        "protocolVersion": "2024-11-05",
                        "capabilities": {"tools": {}},
                        "serverInfo": {"name": "fake-fun", "version": "0.0.1"}
                    }),
                ),
                "tools/list" => {
                    let tools: Vec<Value> = self
                        .tools
                        .iter()
                        .map(|(name, _)| json!({"name": name, "inputSchema": {"type": "object"}}))
                        .collect();
                    self.respond(id, json!({ "tools": tools }));
                }
                "tools/call" => {
                    let name = msg["params"]["name"].as_str().unwrap().to_string();
                    self.recorder
                        .calls
                        .lock()
                        .unwrap()
                        .push((name.clone(), msg["params"]["arguments"].clone()));
                    let behavior = self
                        .tools
                        .iter()
                        .find(|(n, _)| *n == name)
                        .map(|(_, b)| b.clone());
                    match behavior {
                        Some(Behavior::Text(text)) => self.respond(
                            id,
                            json!({"content": [{"type": "text", "text": text}], "isError": false}),
                        ),
                        Some(Behavior::Hangup) => self.dead = true,
                        None => self.inbox.push_back(
                            json!({"jsonrpc": "2.0", "id": id,
                                   "error": {"code": -32602, "message": format!("Unknown tool: {name}")}})
                            .to_string(),
                        ),
                    }
                }
                other => panic!("unexpected method {other}"),
            }
            Ok(())
        })
    }

    fn recv(&mut self) -> ChannelFuture<'_, Option<String>> {
        Box::pin(async move { Ok(self.inbox.pop_front()) })
    }

    fn close(&mut self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(async move {
            self.recorder.closes.fetch_add(1, Ordering::SeqCst);
            self.dead = true;
        })
    }
}

const WEATHER_TEXT: &str = "New Delhi: 31°C, clear skies";
const JOKE_TEXT: &str = "Why did the scarecrow win an award? He was outstanding in his field.";

fn fun_tools() -> Vec<(&'static str, Behavior)> {
    vec![
        ("get_weather", Behavior::Text(WEATHER_TEXT)),
        ("random_joke", Behavior::Text(JOKE_TEXT)),
        ("random_dog", Behavior::Hangup),
    ]
}

async fn ready_session(tools: Vec<(&'static str, Behavior)>) -> (Session, Arc<Recorder>) {
    let (server, recorder) = FakeServer::new(tools);
    let mut session = Session::new(Box::new(server), SessionOptions::default());
    session.initialize().await.unwrap();
    session.list_tools().await.unwrap();
    (session, recorder)
}

// ---------------------------------------------------------------------------
// Scenarios over the fake server
// ---------------------------------------------------------------------------

#[tokio::test]
async fn weather_renders_tool_text() {
    let (mut session, recorder) = ready_session(fun_tools()).await;
    let mut dispatcher = Dispatcher::new(&mut session, Arc::new(KeywordDecider));

    let turn = dispatcher.turn("what's the weather").await;
    assert_eq!(turn, Turn::Reply(WEATHER_TEXT.to_string()));

    let calls = recorder.calls.lock().unwrap();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].0, "get_weather");
    assert_eq!(calls[0].1, json!({"latitude": 28.6139, "longitude": 77.209}));
}

#[tokio::test]
async fn unrecognized_input_answers_without_session() {
    let (mut session, recorder) = ready_session(fun_tools()).await;
    let writes_before = recorder.writes();
    let mut dispatcher = Dispatcher::new(&mut session, Arc::new(KeywordDecider));

    let turn = dispatcher.turn("purple elephants").await;
    assert_eq!(turn, Turn::Reply(HELP_ANSWER.to_string()));
    assert_eq!(
        turn,
        Turn::Reply("Try: weather, books, joke, dog, movies trivia 🙂".to_string())
    );
    assert_eq!(recorder.writes(), writes_before);
}

#[tokio::test]
async fn unknown_tool_is_reported_without_writes() {
    let (mut session, recorder) = ready_session(fun_tools()).await;
    let writes_before = recorder.writes();
    let decider = JsonDecider::new("scripted", |_: &Conversation| {
        json!({"action": "nonexistent", "args": {}})
    });
    let mut dispatcher = Dispatcher::new(&mut session, Arc::new(decider));

    match dispatcher.turn("anything").await {
        Turn::Reply(reply) => {
            assert!(reply.contains("Unknown tool: nonexistent"), "got: {reply}");
        }
        Turn::Exit => panic!("Expected a reply"),
    }
    assert_eq!(recorder.writes(), writes_before);
    assert!(!dispatcher.is_finished());
}

#[tokio::test]
async fn transport_death_is_reported_and_loop_continues() {
    let (mut session, recorder) = ready_session(fun_tools()).await;
    {
        let mut dispatcher = Dispatcher::new(&mut session, Arc::new(KeywordDecider));

        match dispatcher.turn("show me a dog").await {
            Turn::Reply(reply) => {
                assert!(reply.starts_with("tool 'random_dog' failed"), "got: {reply}");
                assert!(reply.contains("server closed the connection"), "got: {reply}");
            }
            Turn::Exit => panic!("Expected a reply"),
        }

        // The loop keeps accepting turns without a restart
        let turn = dispatcher.turn("purple elephants").await;
        assert_eq!(turn, Turn::Reply(HELP_ANSWER.to_string()));

        match dispatcher.turn("tell me a joke").await {
            Turn::Reply(reply) => assert!(reply.contains("session is closed"), "got: {reply}"),
            Turn::Exit => panic!("Expected a reply"),
        }
        assert_eq!(dispatcher.conversation().len(), 6);
    }
    assert_eq!(session.state(), SessionState::Closed);

    session.close().await;
    assert_eq!(recorder.closes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn protocol_violation_is_reported_and_loop_continues() {
    let (mut session, recorder) = ready_session(fun_tools()).await;
    let writes_before = recorder.writes();
    let decider = JsonDecider::new("scripted", |conv: &Conversation| {
        match conv.last_user_text() {
            Some("joke") => json!({"action": "random_joke"}),
            _ => json!({"intent": "greet", "confidence": 0.4}),
        }
    });
    let mut dispatcher = Dispatcher::new(&mut session, Arc::new(decider));

    match dispatcher.turn("hello there").await {
        Turn::Reply(reply) => assert!(reply.contains("Protocol violation"), "got: {reply}"),
        Turn::Exit => panic!("Expected a reply"),
    }
    assert_eq!(recorder.writes(), writes_before);

    let turn = dispatcher.turn("joke").await;
    assert_eq!(turn, Turn::Reply(JOKE_TEXT.to_string()));
}

#[tokio::test]
async fn exit_is_idempotent() {
    let (mut session, recorder) = ready_session(fun_tools()).await;
    {
        let mut dispatcher = Dispatcher::new(&mut session, Arc::new(KeywordDecider));
        assert_eq!(dispatcher.turn("EXIT").await, Turn::Exit);
        assert_eq!(dispatcher.turn("exit").await, Turn::Exit);
        // Input after exit is ignored
        assert_eq!(dispatcher.turn("what's the weather").await, Turn::Exit);
        assert!(dispatcher.is_finished());
        assert!(dispatcher.conversation().is_empty());
    }

    session.close().await;
    session.close().await;
    assert_eq!(recorder.closes.load(Ordering::SeqCst), 1);
    assert!(recorder.calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn run_reads_until_exit() {
    let (mut session, recorder) = ready_session(fun_tools()).await;
    let input: &[u8] = b"what's the weather\npurple elephants\n  Quit \nwhat's the weather\n";
    let mut out = Vec::new();

    let mut dispatcher = Dispatcher::new(&mut session, Arc::new(KeywordDecider));
    dispatcher.run(input, &mut out).await.unwrap();
    assert!(dispatcher.is_finished());
    assert_eq!(dispatcher.conversation().len(), 4);

    let out = String::from_utf8(out).unwrap();
    assert!(out.contains(&format!("Agent: {WEATHER_TEXT}")));
    assert!(out.contains(&format!("Agent: {HELP_ANSWER}")));
    assert_eq!(out.matches("You: ").count(), 3);
    assert_eq!(recorder.calls.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn run_stops_at_end_of_input() {
    let (mut session, _) = ready_session(fun_tools()).await;
    let input: &[u8] = b"tell me a joke\n";
    let mut out = Vec::new();

    let mut dispatcher = Dispatcher::new(&mut session, Arc::new(KeywordDecider));
    dispatcher.run(input, &mut out).await.unwrap();
    assert!(dispatcher.is_finished());

    let out = String::from_utf8(out).unwrap();
    assert!(out.contains(&format!("Agent: {JOKE_TEXT}")));
}

// ---------------------------------------------------------------------------
// Real child process
// ---------------------------------------------------------------------------

/// Minimal stdio MCP server in bash. `random_dog` makes it exit mid-call.
const BASH_SERVER: &str = r##"
while IFS= read -r line; do
  id=$(printf '%s' "$line" | sed -n 's/^{"jsonrpc":"2.0","id":\([0-9]*\).*/\1/p')
  case "$line" in
    *'"method":"initialize"'*)
      printf '{"jsonrpc":"2.0","id":%s,"result":{"protocolVersion":"2024-11-05","capabilities":{"tools":{}},"serverInfo":{"name":"bash-fun","version":"0.1"}}}\n' "$id" ;;
    *'"method":"tools/list"'*)
      printf '{"jsonrpc":"2.0","id":%s,"result":{"tools":[{"name":"random_joke","inputSchema":{"type":"object"}},{"name":"random_dog","inputSchema":{"type":"object"}}]}}\n' "$id" ;;
    *'"name":"random_joke"'*)
      printf '{"jsonrpc":"2.0","id":%s,"result":{"content":[{"type":"text","text":"A bash joke."}]}}\n' "$id" ;;
    *'"name":"random_dog"'*)
      exit 0 ;;
  esac
done
"##;

fn bash_config() -> ServerConfig {
    ServerConfig {
        command: "bash".to_string(),
        args: vec!["-c".to_string(), BASH_SERVER.to_string()],
        env: HashMap::new(),
        handshake_timeout_ms: 5000,
        call_timeout_ms: Some(5000),
        shutdown_grace_ms: 1000,
    }
}

#[tokio::test]
async fn run_lines_reads_until_exit_or_closed_channel() {
    let (mut session, recorder) = ready_session(fun_tools()).await;
    let (tx, mut rx) = tokio::sync::mpsc::channel(8);
    tx.send("tell me a joke".to_string()).await.unwrap();
    tx.send("exit".to_string()).await.unwrap();
    tx.send("what's the weather".to_string()).await.unwrap();
    let mut out = Vec::new();

    let mut dispatcher = Dispatcher::new(&mut session, Arc::new(KeywordDecider));
    dispatcher.run_lines(&mut rx, &mut out).await.unwrap();
    assert!(dispatcher.is_finished());
    assert_eq!(recorder.calls.lock().unwrap().len(), 1);

    let (mut session, _) = ready_session(fun_tools()).await;
    let (tx, mut rx) = tokio::sync::mpsc::channel::<String>(8);
    drop(tx);
    let mut dispatcher = Dispatcher::new(&mut session, Arc::new(KeywordDecider));
    dispatcher.run_lines(&mut rx, &mut out).await.unwrap();
    assert!(dispatcher.is_finished());

    let out = String::from_utf8(out).unwrap();
    assert!(out.contains(&format!("Agent: {JOKE_TEXT}")));
    assert!(!out.contains(WEATHER_TEXT));
}

#[tokio::test]
async fn run_lines_can_be_abandoned_while_waiting() {
    let (mut session, _) = ready_session(fun_tools()).await;
    let (_tx, mut rx) = tokio::sync::mpsc::channel::<String>(8);
    let mut out = Vec::new();

    let mut dispatcher = Dispatcher::new(&mut session, Arc::new(KeywordDecider));
    let waited = tokio::time::timeout(
        std::time::Duration::from_millis(50),
        dispatcher.run_lines(&mut rx, &mut out),
    )
    .await;
    assert!(waited.is_err());
    assert!(!dispatcher.is_finished());
    assert_eq!(dispatcher.turn("quit").await, Turn::Exit);
}

#[tokio::test]
async fn dispatch_over_child_process() {
    let mut conn = Connection::open(&bash_config()).await.unwrap();
    assert_eq!(conn.tool_names(), vec!["random_joke", "random_dog"]);

    let input: &[u8] = b"joke\ndog\npurple elephants\nexit\n";
    let mut out = Vec::new();
    {
        let mut dispatcher = Dispatcher::new(conn.session_mut(), Arc::new(KeywordDecider));
        dispatcher.run(input, &mut out).await.unwrap();
    }

    let out = String::from_utf8(out).unwrap();
    assert!(out.contains("Agent: A bash joke."), "got: {out}");
    assert!(out.contains("Agent: tool 'random_dog' failed"), "got: {out}");
    assert!(out.contains(&format!("Agent: {HELP_ANSWER}")), "got: {out}");

    conn.close().await;
}

#[tokio::test]
async fn repeated_exit_then_close_stops_server_once() {
    let mut conn = Connection::open(&bash_config()).await.unwrap();
    let pid = conn.server_pid().unwrap();

    {
        let mut dispatcher = Dispatcher::new(conn.session_mut(), Arc::new(KeywordDecider));
        let mut out = Vec::new();
        dispatcher.run(&b"quit\n"[..], &mut out).await.unwrap();
        assert!(dispatcher.is_finished());

        // A second exit and a second run are no-ops
        assert_eq!(dispatcher.turn("exit").await, Turn::Exit);
        dispatcher.run(&b"joke\n"[..], &mut out).await.unwrap();
        assert!(!String::from_utf8(out).unwrap().contains("Agent:"));
    }
    assert_eq!(conn.session().state(), SessionState::Ready);

    conn.close().await;
    #[cfg(target_os = "linux")]
    assert!(!std::path::Path::new(&format!("/proc/{pid}")).exists());
    let _ = pid;
}
