//! Shared helpers for two-peer runtime tests over the loopback transport

#![allow(dead_code)]

use std::time::Duration;

use peerchat_core::ChatConfig;
use peerchat_harness::LoopbackNetwork;
use peerchat_runtime::{
    AppEvent, AppEventReceiver, Command, PeerId, RuntimeBuilder, RuntimeHandle, SessionContext,
    SessionState,
};
use tokio::time::timeout;

/// Upper bound for any single expectation; paused time makes this free
pub const EXPECT_WITHIN: Duration = Duration::from_secs(60);

pub struct TestPeer {
    pub handle: RuntimeHandle,
    pub events: AppEventReceiver,
}

impl TestPeer {
    /// Start a peer and wait until it is registered on the network
    pub async fn spawn(network: &LoopbackNetwork, id: &str, secret: &str) -> Self {
        Self::spawn_with(network, id, secret, ChatConfig::testing()).await
    }

    pub async fn spawn_with(
        network: &LoopbackNetwork,
        id: &str,
        secret: &str,
        config: ChatConfig,
    ) -> Self {
        let mut peer = Self::start(network, id, secret, config).await;
        peer.expect(|event| matches!(event, AppEvent::IdentityAssigned { .. }))
            .await;
        peer
    }

    /// Start a peer without waiting for registration
    pub async fn start(
        network: &LoopbackNetwork,
        id: &str,
        secret: &str,
        config: ChatConfig,
    ) -> Self {
        let mut handle = RuntimeBuilder::new(SessionContext::new(PeerId::new(id), secret))
            .with_config(config)
            .with_transport(Box::new(network.transport()))
            .build_and_start()
            .await
            .expect("runtime should start");
        let events = handle
            .take_app_event_receiver()
            .expect("app event receiver available once");
        Self { handle, events }
    }

    pub async fn send(&self, command: Command) {
        self.handle
            .send_command(command)
            .await
            .expect("runtime accepts commands");
    }

    /// Wait for the first app event matching `predicate`, skipping others
    pub async fn expect<F>(&mut self, mut predicate: F) -> AppEvent
    where
        F: FnMut(&AppEvent) -> bool,
    {
        let events = &mut self.events;
        timeout(EXPECT_WITHIN, async {
            loop {
                let event = events.recv().await.expect("runtime stopped");
                if predicate(&event) {
                    return event;
                }
            }
        })
        .await
        .expect("expected app event did not arrive")
    }

    /// Assert that no event matching `predicate` arrives within `window`
    pub async fn expect_none<F>(&mut self, mut predicate: F, window: Duration)
    where
        F: FnMut(&AppEvent) -> bool,
    {
        let events = &mut self.events;
        let found = timeout(window, async {
            loop {
                match events.recv().await {
                    Some(event) if predicate(&event) => return event,
                    Some(_) => continue,
                    None => std::future::pending::<()>().await,
                }
            }
        })
        .await;
        if let Ok(event) = found {
            panic!("unexpected app event: {:?}", event);
        }
    }

    pub async fn expect_state(&mut self, state: SessionState) {
        self.expect(|event| {
            matches!(event, AppEvent::SessionStateChanged { state: s, .. } if *s == state)
        })
        .await;
    }

    pub async fn expect_notice(&mut self, text: &str) {
        self.expect(|event| matches!(event, AppEvent::SystemNotice { text: t } if t == text))
            .await;
    }

    pub async fn expect_status(&mut self, text: &str) {
        self.expect(|event| matches!(event, AppEvent::StatusChanged { text: t, .. } if t == text))
            .await;
    }

    pub async fn shutdown(mut self) {
        self.handle.shutdown().await.expect("clean shutdown");
    }
}

/// Start two peers and open a session from `a` to `b`
pub async fn connected_pair(network: &LoopbackNetwork, secret: &str) -> (TestPeer, TestPeer) {
    let mut a = TestPeer::spawn(network, "alice", secret).await;
    let mut b = TestPeer::spawn(network, "bob", secret).await;

    a.send(Command::Connect {
        remote: "bob".to_string(),
        secret: None,
    })
    .await;
    a.expect_state(SessionState::Open).await;
    b.expect_state(SessionState::Open).await;
    (a, b)
}
