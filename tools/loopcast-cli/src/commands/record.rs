//! Record the focused window through the session coordinator.

use std::sync::Arc;
use std::time::Duration;

use loopcast_capture_engine::{
    Coordinator, CoordinatorSettings, DesktopHost, LogIndicator, StartOutcome,
};
use loopcast_common::config::AppConfig;
use loopcast_job_client::HttpJobClient;
use loopcast_model::session::{SessionState, StatusNotification};

pub async fn run(config: AppConfig, delay: u64) -> anyhow::Result<()> {
    let host = Arc::new(DesktopHost::new(
        config.service.ffmpeg_path.clone(),
        config.recording.capture_fps,
    ));
    let jobs = Arc::new(HttpJobClient::new(config.client.server_url.clone()));
    let (handle, mut notifications) = Coordinator::spawn(
        host,
        jobs,
        Arc::new(LogIndicator),
        CoordinatorSettings::from_config(&config),
    );

    println!("Focus the window to record. Starting in {delay}s...");
    tokio::time::sleep(Duration::from_secs(delay)).await;

    match handle.start().await {
        Ok(StartOutcome::Started { session_id }) => {
            println!("Recording session {session_id}");
            println!("Press Ctrl+C to stop recording...");
            println!();
        }
        Ok(StartOutcome::StoppedPrevious) => {}
        Err(e) => {
            while let Ok(note) = notifications.try_recv() {
                print_notification(&note);
            }
            let _ = handle.shutdown().await;
            return Err(e.into());
        }
    }

    let mut stop_requested = false;
    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c(), if !stop_requested => {
                signal?;
                stop_requested = true;
                println!();
                if let Err(e) = handle.stop().await {
                    tracing::warn!(error = %e, "Stop request rejected");
                }
            }
            note = notifications.recv() => {
                let Some(note) = note else { break };
                print_notification(&note);
                if note.state == SessionState::Idle {
                    break;
                }
            }
        }
    }

    let _ = handle.shutdown().await;
    Ok(())
}

fn print_notification(note: &StatusNotification) {
    let mut line = format!("[{}]", note.state.label());
    if let Some(progress) = note.progress {
        line.push_str(&format!(" {progress}%"));
    }
    if let Some(message) = &note.message {
        line.push(' ');
        line.push_str(message);
    }
    if let SessionState::Error(reason) = &note.state {
        if note.message.as_deref() != Some(reason.as_str()) {
            line.push_str(&format!(" ({reason})"));
        }
    }
    println!("{line}");
}
