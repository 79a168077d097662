//! Terminal display client
//!
//! Subscribes to the push channel, keeps a local `DisplayModel`, counts the
//! timer down between server actions and reconnects with backoff.

use std::time::Duration;

use anyhow::Result;
use futures_util::StreamExt;
use tokio::net::TcpStream;
use tokio::time::{sleep, MissedTickBehavior};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use drawdrum_sync::{DisplayChange, DisplayModel, ReconnectPolicy, SyncEvent, TimerDecoration};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub struct DisplayClient {
    url: String,
    policy: ReconnectPolicy,
}

impl DisplayClient {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            policy: ReconnectPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: ReconnectPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Connect and render until the reconnect attempts run out.
    ///
    /// `render` is called after every applied event and every local tick
    /// that changed the countdown.
    pub async fn run<F>(&self, mut render: F) -> Result<()>
    where
        F: FnMut(&DisplayModel),
    {
        let mut attempt = 0;

        loop {
            match connect_async(self.url.as_str()).await {
                Ok((socket, _response)) => {
                    info!("Connected to {}", self.url);
                    attempt = 0;
                    session(socket, &mut render).await;
                    warn!("Disconnected from {}", self.url);
                }
                Err(e) => {
                    warn!("Failed to connect to {}: {}", self.url, e);
                }
            }

            let Some(delay) = self.policy.delay(attempt) else {
                anyhow::bail!(
                    "Giving up on {} after {} attempts",
                    self.url,
                    self.policy.max_attempts
                );
            };
            attempt += 1;
            info!("Reconnecting in {:.1}s (attempt {})", delay.as_secs_f64(), attempt);
            sleep(delay).await;
        }
    }
}

/// One connection's lifetime; a fresh model each time, since the server
/// sends `init` on every subscribe
async fn session<F>(mut socket: Socket, render: &mut F)
where
    F: FnMut(&DisplayModel),
{
    let mut model = DisplayModel::new();
    let mut ticker = tokio::time::interval(Duration::from_secs(1));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker.tick().await;

    loop {
        tokio::select! {
            next = socket.next() => match next {
                Some(Ok(Message::Text(text))) => match SyncEvent::from_json(text.as_str()) {
                    Ok(event) => {
                        let change = model.apply(event);
                        if let DisplayChange::Rejected(message) = &change {
                            warn!("Server rejected a message: {}", message);
                        }
                        debug!("Applied {:?}", change);
                        render(&model);
                    }
                    Err(e) => warn!("Dropped unknown payload: {}", e),
                },
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!("Read error: {}", e);
                    break;
                }
            },
            _ = ticker.tick() => {
                if model.countdown.tick() {
                    render(&model);
                }
            }
        }
    }
}

/// Plain-text frame for a terminal
pub fn render_frame(model: &DisplayModel) -> String {
    let mut frame = String::new();

    if let Some(logo) = model.logo() {
        frame.push_str(&format!("[logo {}]\n", logo));
    }

    for (index, column) in model.columns().iter().enumerate() {
        if model.formatting.columns > 1 {
            frame.push_str(&format!("-- column {} --\n", index + 1));
        }
        for line in column {
            frame.push_str(line);
            frame.push('\n');
        }
    }

    if !model.prize_text.is_empty() {
        frame.push_str(&format!("Prize: {}\n", model.prize_text));
    }

    let marker = match model.countdown.decoration() {
        TimerDecoration::Normal => "",
        TimerDecoration::Warning => " (!)",
        TimerDecoration::Danger => " (!!)",
        TimerDecoration::Finished => " TIME",
    };
    frame.push_str(&format!("{}{}", model.countdown.label(), marker));
    frame
}
