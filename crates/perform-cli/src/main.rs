//! Streams one session from an HTTP endpoint and prints what gets routed.

mod config;

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use perform_stream::prelude::*;
use perform_stream::{LogEntry, init_observability};
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "perform-cli")]
#[command(about = "Consume a perform event stream for one session")]
#[command(version)]
struct Args {
    /// Endpoint answering with the event stream
    #[arg(long, env = "PERFORM_STREAM_URL")]
    url: String,

    /// Session id to start (a fresh UUID when omitted)
    #[arg(long)]
    session_id: Option<String>,

    /// JSON request body sent to the endpoint
    #[arg(long)]
    payload: Option<String>,

    /// Connect timeout in seconds
    #[arg(long, env = "PERFORM_CONNECT_TIMEOUT_SECS", default_value_t = 10)]
    connect_timeout_secs: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    config::init();
    init_observability();
    let args = Args::parse();

    let payload = args
        .payload
        .as_deref()
        .map(serde_json::from_str::<serde_json::Value>)
        .transpose()
        .map_err(|e| StreamError::Validation(format!("--payload is not valid JSON: {e}")))?;
    let session = args
        .session_id
        .map(SessionId::new)
        .unwrap_or_else(SessionId::generate);

    let transport = HttpTransport::new(
        HttpTransportConfig::new(args.url)
            .connect_timeout(Duration::from_secs(args.connect_timeout_secs)),
    )?;
    let context = StreamContext::builder()
        .transport(Arc::new(transport))
        .build()?;

    let store = context.store().clone();
    context.observers().register(move |notification| match notification {
        Notification::EventRouted {
            session_id,
            kind,
            event_id,
            ..
        } => println!("[{session_id}] {kind} {event_id}"),
        Notification::ActiveNotesChanged => {
            let held: Vec<String> = store
                .active_notes()
                .iter()
                .map(|(midi, note)| format!("{}({midi},{})", note.key_name, note.hand))
                .collect();
            println!("held: [{}]", held.join(" "));
        }
        Notification::StateChanged { session_id, state } => {
            println!("[{session_id}] state {state:?}");
        }
    });

    info!(session_id = %session, "starting stream session");
    context.start(session.clone(), payload)?;
    let controller = context.controller(session.clone());

    let state = tokio::select! {
        state = controller.wait_terminal() => state,
        _ = tokio::signal::ctrl_c() => {
            warn!("interrupted, cancelling session");
            controller.cancel();
            controller.state()
        }
    };

    print_summary(&context, &session, &controller);
    context.shutdown();

    match state {
        SessionState::Failed(err) => Err(StreamError::Transport(err).into()),
        _ => Ok(()),
    }
}

fn print_summary(context: &StreamContext, session: &SessionId, controller: &StreamSessionController) {
    let store = context.store();
    let log = store.session_log(session);
    println!();
    println!("session {session}: {:?}", controller.state());
    for entry in log.grouped() {
        match entry {
            LogEntry::Event(event) => {
                println!("  {} {}", event.kind(), event.body.as_text().unwrap_or_default());
            }
            LogEntry::PlanningGroup { content, events, .. } => {
                println!("  planning ({} steps)\n    {}", events.len(), content.replace('\n', "\n    "));
            }
        }
    }
    let stats = controller.stats();
    println!(
        "events {} | duplicates {} | dropped {} | performance log {} | held notes {}",
        stats.events_routed,
        stats.duplicates,
        stats.dropped,
        store.performance_log().len(),
        store.active_notes().len()
    );
}
