#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::{Duration, Instant};

    use async_trait::async_trait;
    use parking_lot::Mutex;
    use scout_channels::{Channel, ChannelEvent, IncomingMessage, OutgoingMessage};
    use scout_config::ScoutConfig;
    use scout_llm::mock::MockInference;
    use scout_runtime::{AllowList, Providers, ScoutRuntime};
    use tempfile::TempDir;
    use tokio::sync::mpsc;

    /// Delivers a fixed set of messages, then closes its event stream.
    struct ScriptedChannel {
        inbound: Vec<(String, String)>,
        sent: Arc<Mutex<Vec<OutgoingMessage>>>,
        stopped: Arc<AtomicBool>,
    }

    #[async_trait]
    impl Channel for ScriptedChannel {
        fn id(&self) -> &str {
            "scripted"
        }

        fn channel_type(&self) -> &str {
            "scripted"
        }

        async fn start(&mut self) -> scout_core::Result<mpsc::Receiver<ChannelEvent>> {
            let (tx, rx) = mpsc::channel(16);
            for (i, (chat, text)) in self.inbound.drain(..).enumerate() {
                tx.send(ChannelEvent::Message(IncomingMessage {
                    id: i.to_string(),
                    channel: "scripted".into(),
                    chat_id: chat,
                    sender: "tester".into(),
                    sender_name: None,
                    text: Some(text),
                }))
                .await
                .unwrap();
            }
            Ok(rx)
        }

        async fn send(&self, message: OutgoingMessage) -> scout_core::Result<()> {
            self.sent.lock().push(message);
            Ok(())
        }

        async fn send_typing(&self, _target: &str) -> scout_core::Result<()> {
            Ok(())
        }

        async fn stop(&mut self) -> scout_core::Result<()> {
            self.stopped.store(true, Ordering::SeqCst);
            Ok(())
        }

        fn is_connected(&self) -> bool {
            true
        }
    }

    fn runtime(mock: &Arc<MockInference>) -> (TempDir, ScoutRuntime) {
        let dir = TempDir::new().unwrap();
        let mut config = ScoutConfig::default();
        config.repository.root = dir.path().to_path_buf();
        config.research.reports_dir = dir.path().join("reports");
        let providers = Providers::from_config(&config.providers);
        let runtime =
            ScoutRuntime::with_parts(config, Arc::clone(mock) as Arc<dyn scout_llm::InferenceClient>, providers)
                .unwrap();
        (dir, runtime)
    }

    #[tokio::test]
    async fn test_serve_stops_channel_with_message_in_flight() {
        let mock = Arc::new(
            MockInference::new()
                .with_response("slow answer")
                .with_latency(Duration::from_secs(5)),
        );
        let (_dir, runtime) = runtime(&mock);
        let sent = Arc::new(Mutex::new(Vec::new()));
        let stopped = Arc::new(AtomicBool::new(false));
        let channel = ScriptedChannel {
            inbound: vec![("100".into(), "what moved today?".into())],
            sent: Arc::clone(&sent),
            stopped: Arc::clone(&stopped),
        };

        let started = Instant::now();
        runtime
            .serve(Box::new(channel), AllowList::new(vec!["100".into()]))
            .await
            .unwrap();

        assert!(stopped.load(Ordering::SeqCst), "channel was not stopped");
        assert!(started.elapsed() < Duration::from_secs(4));
        assert!(sent.lock().is_empty());
    }

    #[tokio::test]
    async fn test_serve_ignores_chats_off_the_allow_list() {
        let mock = Arc::new(MockInference::new().with_response("should not be used"));
        let (_dir, runtime) = runtime(&mock);
        let sent = Arc::new(Mutex::new(Vec::new()));
        let stopped = Arc::new(AtomicBool::new(false));
        let channel = ScriptedChannel {
            inbound: vec![("999".into(), "hello".into())],
            sent: Arc::clone(&sent),
            stopped: Arc::clone(&stopped),
        };

        runtime
            .serve(Box::new(channel), AllowList::new(vec!["100".into()]))
            .await
            .unwrap();

        assert!(stopped.load(Ordering::SeqCst));
        assert!(sent.lock().is_empty());
        assert_eq!(runtime.agent().store().len("999").await, 0);
    }
}
