//! Fakes for the collaborator traits, shared by the unit tests.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::io;
use std::rc::Rc;
use std::time::Duration;

use anyhow::anyhow;

use crate::clock::Clock;
use crate::connectivity::{ConnectionState, Link};
use crate::error::{ConnectError, PublishError};
use crate::inverter::Transport;
use crate::mqtt_config::MqttConfig;
use crate::mqtt_wrapper::{LastWill, MqttWrapper, QoS};
use crate::protocol::{REPLY_LEN, REQUEST_LEN};
use crate::pvoutput::FormPoster;

/// Clock that only moves when slept on. Clones share the same time.
#[derive(Clone)]
pub struct FakeClock {
    base_epoch: u64,
    millis: Rc<Cell<u64>>,
}

impl FakeClock {
    pub fn at(epoch: u64) -> Self {
        Self {
            base_epoch: epoch,
            millis: Rc::new(Cell::new(0)),
        }
    }

    pub fn advance(&self, duration: Duration) {
        self.millis.set(self.millis.get() + duration.as_millis() as u64);
    }
}

impl Clock for FakeClock {
    fn epoch(&self) -> u64 {
        self.base_epoch + self.millis.get() / 1000
    }

    fn millis(&self) -> u64 {
        self.millis.get()
    }

    fn sleep(&self, duration: Duration) {
        self.advance(duration);
    }
}

type Responder = Box<dyn FnMut(&[u8; REQUEST_LEN]) -> io::Result<[u8; REPLY_LEN]>>;

/// Inverter bus answering from a script and recording every request.
pub struct ScriptedTransport {
    responder: Responder,
    sent: Vec<[u8; REQUEST_LEN]>,
}

impl ScriptedTransport {
    /// Reply with `replies` in order; time out once they run out.
    pub fn new(replies: Vec<io::Result<[u8; REPLY_LEN]>>) -> Self {
        let mut replies = VecDeque::from(replies);
        Self::responding(move |_: &[u8; REQUEST_LEN]| {
            replies
                .pop_front()
                .unwrap_or_else(|| Err(io::ErrorKind::TimedOut.into()))
        })
    }

    pub fn responding(
        responder: impl FnMut(&[u8; REQUEST_LEN]) -> io::Result<[u8; REPLY_LEN]> + 'static,
    ) -> Self {
        Self {
            responder: Box::new(responder),
            sent: Vec::new(),
        }
    }

    pub fn sent(&self) -> &[[u8; REQUEST_LEN]] {
        &self.sent
    }
}

impl Transport for ScriptedTransport {
    fn transact(
        &mut self,
        request: &[u8; REQUEST_LEN],
        reply: &mut [u8; REPLY_LEN],
    ) -> io::Result<()> {
        self.sent.push(*request);
        *reply = (self.responder)(request)?;
        Ok(())
    }
}

/// Network link whose reachability the test controls.
pub struct FakeLink {
    reachable: bool,
    attempts: u32,
    up_after: Option<u32>,
}

impl FakeLink {
    pub fn reachable() -> Self {
        Self {
            reachable: true,
            attempts: 0,
            up_after: None,
        }
    }

    pub fn unreachable() -> Self {
        Self {
            reachable: false,
            ..Self::reachable()
        }
    }

    /// Become reachable on the `n`th connect attempt.
    pub fn up_after_attempts(&mut self, n: u32) {
        self.up_after = Some(n);
    }

    pub fn set_reachable(&mut self, reachable: bool) {
        self.reachable = reachable;
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}

impl Link for FakeLink {
    fn connect(&mut self) -> Result<(), ConnectError> {
        self.attempts += 1;
        if self.up_after.is_some_and(|n| self.attempts >= n) {
            self.reachable = true;
        }
        Ok(())
    }

    fn state(&mut self) -> ConnectionState {
        if self.reachable {
            ConnectionState::Connected
        } else {
            ConnectionState::Disconnected
        }
    }
}

#[derive(Default)]
struct BrokerState {
    reachable: bool,
    connected: bool,
    fail_publishes: bool,
    attempts: u32,
    will: Option<LastWill>,
    published: Vec<(String, String, bool)>,
}

/// In-memory broker client. Clones share the same broker.
#[derive(Clone, Default)]
pub struct MqttTester {
    state: Rc<RefCell<BrokerState>>,
}

impl MqttTester {
    pub fn with_broker(reachable: bool) -> Self {
        let tester = Self::default();
        tester.state.borrow_mut().reachable = reachable;
        tester
    }

    pub fn published(&self) -> Vec<(String, String, bool)> {
        self.state.borrow().published.clone()
    }

    pub fn attempts(&self) -> u32 {
        self.state.borrow().attempts
    }

    pub fn last_will(&self) -> Option<LastWill> {
        self.state.borrow().will.clone()
    }

    pub fn fail_publishes(&self, fail: bool) {
        self.state.borrow_mut().fail_publishes = fail;
    }
}

impl Link for MqttTester {
    fn connect(&mut self) -> Result<(), ConnectError> {
        let mut state = self.state.borrow_mut();
        state.attempts += 1;
        state.connected = state.reachable;
        Ok(())
    }

    fn state(&mut self) -> ConnectionState {
        if self.state.borrow().connected {
            ConnectionState::Connected
        } else {
            ConnectionState::Disconnected
        }
    }
}

impl MqttWrapper for MqttTester {
    fn publish<S, V>(&mut self, topic: S, _qos: QoS, retain: bool, payload: V) -> anyhow::Result<()>
    where
        S: Clone + Into<String>,
        V: Clone + Into<Vec<u8>>,
    {
        let mut state = self.state.borrow_mut();
        if state.fail_publishes {
            return Err(anyhow!("request channel closed"));
        }
        let payload = String::from_utf8(payload.into())?;
        state.published.push((topic.into(), payload, retain));
        Ok(())
    }

    fn set_last_will(&mut self, will: LastWill) {
        self.state.borrow_mut().will = Some(will);
    }

    fn pump(&mut self) {}

    fn new(_config: &MqttConfig, _suffix: &str) -> Self {
        Self::with_broker(true)
    }
}

pub struct PostedRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

/// HTTP client answering with scripted status codes. Clones share the log.
#[derive(Clone)]
pub struct FakePoster {
    responses: Rc<RefCell<VecDeque<Result<u16, PublishError>>>>,
    requests: Rc<RefCell<Vec<PostedRequest>>>,
}

impl FakePoster {
    pub fn new(responses: Vec<Result<u16, PublishError>>) -> Self {
        Self {
            responses: Rc::new(RefCell::new(responses.into())),
            requests: Rc::default(),
        }
    }

    pub fn requests(&self) -> std::cell::Ref<'_, Vec<PostedRequest>> {
        self.requests.borrow()
    }
}

impl FormPoster for FakePoster {
    fn post_form(
        &mut self,
        url: &str,
        headers: &[(&str, &str)],
        body: &str,
    ) -> Result<u16, PublishError> {
        self.requests.borrow_mut().push(PostedRequest {
            url: url.into(),
            headers: headers
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            body: body.into(),
        });
        self.responses
            .borrow_mut()
            .pop_front()
            .unwrap_or_else(|| Err(PublishError::Transport("connection refused".into())))
    }
}
