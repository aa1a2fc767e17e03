//! `stepwise stream`: stream a run's events; Ctrl-C cancels the session.

use std::path::PathBuf;
use std::sync::Arc;
use stepwise_agent::{ChannelSink, SessionManager, StreamEvent, StreamOutcome, StreamingAdapter};

pub async fn run(message: &str, workdir: PathBuf, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config()?;
    let template = super::build_template(&config, workdir)?;

    let adapter = StreamingAdapter::from_config(&config.streaming, Arc::new(SessionManager::new()));
    let (sink, mut rx) = ChannelSink::channel(config.streaming.channel_capacity);
    let handle = adapter.start(template.instantiate(), message, sink).await?;
    let session_id = handle.session_id.clone();

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut cancelled = false;

    loop {
        tokio::select! {
            event = rx.recv() => match event {
                Some(event) => print_event(&event, json)?,
                None => break,
            },
            _ = &mut ctrl_c, if !cancelled => {
                cancelled = true;
                let stopped = adapter.cancel(&session_id)?;
                eprintln!();
                eprintln!("  [cancel] session {session_id} stopped: {stopped}");
            }
        }
    }

    match handle.wait().await {
        StreamOutcome::Finished(outcome) => eprintln!("  [{}]", outcome.label()),
        StreamOutcome::Failed(cause) => return Err(cause.into()),
        StreamOutcome::Cancelled => eprintln!("  [cancelled]"),
        StreamOutcome::TimedOut => eprintln!(
            "  [timed out after {}s]",
            config.streaming.timeout_secs
        ),
    }
    Ok(())
}

fn print_event(event: &StreamEvent, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    if json {
        println!("{}", serde_json::to_string(event)?);
        return Ok(());
    }

    match event {
        StreamEvent::StreamInfo {
            session_id,
            conversation_id,
            ..
        } => eprintln!("  session {session_id} (conversation {conversation_id})"),
        StreamEvent::Thought { content } => println!("  Thought > {content}"),
        StreamEvent::ToolStart { name, .. } => println!("  Tool    > {name}"),
        StreamEvent::ToolArgs { arguments, .. } => println!("    args: {arguments}"),
        StreamEvent::ToolResult {
            output, success, ..
        } => {
            let mark = if *success { "ok" } else { "failed" };
            for line in output.lines() {
                println!("    {mark}: {line}");
            }
        }
        StreamEvent::FinalResponse { content } => {
            println!();
            for line in content.lines() {
                println!("  Assistant > {line}");
            }
        }
        StreamEvent::Error { message } => eprintln!("  [Error] {message}"),
        StreamEvent::Complete => println!(),
    }
    Ok(())
}
