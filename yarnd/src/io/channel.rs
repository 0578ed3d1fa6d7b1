//! The pub/sub driver pair.
//!
//! Instead of buffering, the `channel` output driver publishes every pushed
//! message onto a broadcast channel; whoever wants the output subscribes and
//! fans it out (to a websocket bridge, a log shipper, another process...).
//! Random access reads are impossible by construction, so `size` and `pop`
//! refuse and the wire layer answers 501.
//!
//! The input direction is a listener rather than a driver: commands arrive
//! on a broadcast channel and are forwarded into the input buffer store,
//! exactly as if a client had posted them.

use protocol::{OutputMessage, PublishedCommand, PublishedOutput};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;

use crate::error::{Error, Result};
use crate::io::{InputDriver, OutputDriver, now_secs};

/// Publishes output instead of buffering it.
pub struct ChannelOutput {
    stream: String,
    publisher: broadcast::Sender<PublishedOutput>,
    // Order counters still live here so subscribers can re-sort per buffer.
    orders: Mutex<HashMap<(u64, String, String), u64>>,
}

impl ChannelOutput {
    pub fn new(stream: String, capacity: usize) -> ChannelOutput {
        let (publisher, _) = broadcast::channel(capacity.max(1));
        ChannelOutput {
            stream,
            publisher,
            orders: Mutex::new(HashMap::new()),
        }
    }

    /// Subscribes to everything this driver publishes.
    pub fn subscribe(&self) -> broadcast::Receiver<PublishedOutput> {
        self.publisher.subscribe()
    }
}

impl OutputDriver for ChannelOutput {
    fn name(&self) -> &str {
        "channel"
    }

    fn size(&self, _game_id: u64, _entity: &str, _channel: &str) -> Result<usize> {
        Err(Error::Unsupported(
            "the channel output driver does not support reads".to_string(),
        ))
    }

    fn push(&self, game_id: u64, entity: &str, channel: &str, content: String) {
        let order = {
            let mut orders = self.orders.lock().unwrap();
            let counter = orders
                .entry((game_id, entity.to_string(), channel.to_string()))
                .or_insert(0);
            let order = *counter;
            *counter += 1;
            order
        };

        let published = PublishedOutput {
            stream: self.stream.clone(),
            game_id,
            entity: entity.to_string(),
            channel: channel.to_string(),
            message: OutputMessage {
                timestamp: now_secs(),
                order,
                content,
            },
        };

        // No subscribers is normal (nobody is watching); everything else is
        // impossible with a broadcast sender we own.
        let _ = self.publisher.send(published);
    }

    fn pop(&self, _game_id: u64, _entity: &str, _channel: &str) -> Result<Option<OutputMessage>> {
        Err(Error::Unsupported(
            "the channel output driver does not support reads".to_string(),
        ))
    }

    fn discard_game(&self, game_id: u64) {
        self.orders
            .lock()
            .unwrap()
            .retain(|(id, _, _), _| *id != game_id);
    }
}

/// Forwards commands published on a broadcast channel into the input buffer
/// store. Named `"channel"` in `input.listeners`.
pub struct ChannelInputListener {
    stream: String,
    producer: broadcast::Sender<PublishedCommand>,
    task: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl ChannelInputListener {
    pub fn new(stream: String, capacity: usize) -> ChannelInputListener {
        let (producer, _) = broadcast::channel(capacity.max(1));
        ChannelInputListener {
            stream,
            producer,
            task: Mutex::new(None),
        }
    }

    /// Handle for producers that want to feed commands in.
    pub fn producer(&self) -> broadcast::Sender<PublishedCommand> {
        self.producer.clone()
    }

    /// Starts forwarding into the given input driver. Idempotent.
    pub fn start(&self, input: Arc<dyn InputDriver>) {
        let mut task = self.task.lock().unwrap();
        if task.is_some() {
            return;
        }

        let mut receiver = self.producer.subscribe();
        let stream = self.stream.clone();
        *task = Some(tokio::spawn(async move {
            loop {
                match receiver.recv().await {
                    Ok(command) => {
                        input.set(command.game_id, &command.entity, command.command);
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::error!(
                            stream,
                            skipped_commands = skipped,
                            "Input listener lagged; commands were lost."
                        );
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }));
    }

    pub fn stop(&self) {
        if let Some(task) = self.task.lock().unwrap().take() {
            task.abort();
        }
    }
}

impl Drop for ChannelInputListener {
    fn drop(&mut self) {
        self.stop();
    }
}
