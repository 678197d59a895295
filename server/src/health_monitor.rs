use std::collections::HashMap;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tracing::error;

/// Watchdog for the background loops. Tasks report heartbeats by name; a
/// periodic sweep flags any task that has gone silent. It only reports:
/// availability wins over restarting the process.
pub struct HealthMonitor {
    sender: mpsc::UnboundedSender<String>,
}

impl HealthMonitor {
    pub fn new() -> Self {
        let (sender, mut receiver) = mpsc::unbounded_channel::<String>();

        tokio::spawn(async move {
            let mut map: HashMap<String, Instant> = HashMap::new();
            let mut interval = tokio::time::interval(Duration::from_secs(15));
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        for (task_name, last_heartbeat) in &map {
                            if last_heartbeat.elapsed() > Duration::from_secs(600) {
                                error!("No health reports from {task_name} for 10 minutes");
                            }
                        }
                    }
                    Some(task_name) = receiver.recv() => {
                        map.insert(task_name, Instant::now());
                    }
                }
            }
        });

        Self { sender }
    }

    pub fn im_alive(&self, task_name: &str) {
        let _ = self.sender.send(task_name.to_string());
    }
}
