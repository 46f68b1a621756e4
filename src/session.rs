//! The protocol session
//!
//! A [`Session`] owns a transport, a receiver task, and the shared state
//! both sides of the conversation touch. Commands can be issued from any
//! number of tasks; each command is correlated with its completion by tag,
//! so issuing a command while another is in progress pipelines them.
//!
//! The shared state lives behind a regular [`std::sync::Mutex`]. The lock
//! is never held across an await point: callers park on a per-command
//! oneshot channel instead, and the receiver task resolves it when the
//! matching tagged response arrives.

use std::{
    collections::HashMap,
    num::NonZeroU32,
    sync::{Arc, Mutex, MutexGuard},
};

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use futures::StreamExt;
use tokio::{
    io::{AsyncRead, AsyncWrite, AsyncWriteExt},
    sync::{oneshot, Notify},
    task::JoinHandle,
    time::Duration,
};
use tokio_util::codec::FramedRead;

use crate::{
    codec::{ResponseCodec, ResponseCodecError},
    command::{Argument, Command, EncodeError, Fragment},
    config::SessionConfig,
    core::Tag,
    error::{Error, FatalError},
    framing::FramingError,
    registry::ResponseRegistry,
    response::{
        Capability, Code, Condition, ContinueRequest, Data, Response, ResponseData,
        TaggedResponse, TaggedStatus, UntaggedResponse,
    },
    state::ConnectionState,
};

/// Identifies a registered response handler, for later removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

type Handler = Box<dyn FnMut(&Response) + Send>;
type Waiter = oneshot::Sender<Result<TaggedResponse, FatalError>>;

struct SessionInner {
    state: ConnectionState,
    capabilities: Option<Vec<Capability>>,
    registry: ResponseRegistry,
    pending: HashMap<String, Waiter>,
    continuation: Option<oneshot::Sender<ContinueRequest>>,
    handlers: Vec<(HandlerId, Handler)>,
    next_handler_id: u64,
    tag_counter: u64,
    logout_tag: Option<String>,
    fatal: Option<FatalError>,
}

impl SessionInner {
    fn new(state: ConnectionState) -> Self {
        Self {
            state,
            capabilities: None,
            registry: ResponseRegistry::new(),
            pending: HashMap::new(),
            continuation: None,
            handlers: Vec::new(),
            next_handler_id: 0,
            tag_counter: 0,
            logout_tag: None,
            fatal: None,
        }
    }

    fn transition(&mut self, next: ConnectionState) {
        if self.state.can_transition_to(next) {
            self.state = next;
        }
    }

    /// Leave the selected state. A no-op unless a mailbox is selected, so
    /// a failed `SELECT` issued before authentication cannot promote the
    /// connection.
    fn deselect(&mut self) {
        if self.state == ConnectionState::Selected {
            self.transition(ConnectionState::Authenticated);
        }
    }

    /// Record an untagged response in the registry. Status responses are
    /// indexed twice: under the condition name, and (when a code is
    /// present) under the code name, so that callers can retrieve
    /// `[UIDVALIDITY ..]`-style data without scanning all `OK`s.
    fn record_untagged(&mut self, response: &UntaggedResponse) {
        match response {
            UntaggedResponse::Status {
                condition,
                code,
                text,
            } => {
                self.registry.record(
                    condition.name(),
                    ResponseData::Condition {
                        code: code.clone(),
                        text: text.clone(),
                    },
                );

                if let Some(code) = code {
                    self.registry.record(code.name(), ResponseData::Code(code.clone()));

                    if let Code::Capability(caps) = code {
                        self.capabilities = Some(caps.clone());
                    }
                    if let Code::Closed = code {
                        self.deselect();
                    }
                }
            }
            UntaggedResponse::Data(data) => {
                self.registry.record(data.name(), ResponseData::Data(data.clone()));

                if let Data::Capability(caps) = data {
                    self.capabilities = Some(caps.clone());
                }
            }
        }
    }

    fn run_handlers(&mut self, response: &Response) {
        for (_, handler) in &mut self.handlers {
            handler(response);
        }
    }

    /// Record the fatal error (first one wins) and replay it to every
    /// caller blocked on a tagged response or a continuation request.
    fn fail_all(&mut self, fatal: FatalError) {
        if self.fatal.is_none() {
            self.fatal = Some(fatal);
        }
        let fatal = self.fatal.clone().unwrap_or(FatalError::UnexpectedDisconnect(
            "connection closed".into(),
        ));

        for (_, waiter) in self.pending.drain() {
            let _ = waiter.send(Err(fatal.clone()));
        }
        self.continuation = None;

        self.transition(ConnectionState::Logout);
    }

    /// Shut down after a clean logout or a deliberate local disconnect:
    /// there is no error to replay, and later callers get
    /// [`Error::ConnectionClosed`].
    fn close_cleanly(&mut self) {
        self.pending.clear();
        self.continuation = None;
        self.transition(ConnectionState::Logout);
    }
}

/// An IMAP client session over an arbitrary transport.
///
/// Cheap to clone; all clones talk to the same connection.
#[derive(Clone)]
pub struct Session {
    inner: Arc<Mutex<SessionInner>>,
    writer: Arc<tokio::sync::Mutex<Box<dyn AsyncWrite + Send + Unpin>>>,
    receiver: Arc<Mutex<Option<JoinHandle<()>>>>,
    idle_done: Arc<Notify>,
    config: SessionConfig,
}

impl Session {
    /// Open a session over `transport`.
    ///
    /// Reads the server greeting (bounded by
    /// [`SessionConfig::open_timeout`]), derives the initial connection
    /// state from it, and spawns the receiver task.
    pub async fn connect<T>(transport: T, config: SessionConfig) -> Result<Self, Error>
    where
        T: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        let (read_half, write_half) = tokio::io::split(transport);
        let mut framed = FramedRead::new(read_half, ResponseCodec::new(config.max_response_size));

        let greeting = tokio::time::timeout(config.open_timeout, framed.next())
            .await
            .map_err(|_| Error::GreetingTimeout)?
            .ok_or_else(|| {
                Error::UnexpectedDisconnect("connection closed before the greeting".into())
            })??;

        let state = match &greeting {
            Response::Untagged(UntaggedResponse::Status {
                condition, text, ..
            }) => match condition {
                Condition::Ok => ConnectionState::NotAuthenticated,
                Condition::PreAuth => ConnectionState::Authenticated,
                Condition::Bye => return Err(Error::ConnectionRefused(text.clone())),
                _ => {
                    return Err(Error::UnexpectedDisconnect(format!(
                        "unexpected greeting: {} {}",
                        condition.name(),
                        text
                    )))
                }
            },
            _ => {
                return Err(Error::UnexpectedDisconnect(
                    "greeting was not an untagged status".into(),
                ))
            }
        };

        let mut inner = SessionInner::new(state);
        if let Response::Untagged(untagged) = &greeting {
            inner.record_untagged(untagged);
        }

        let inner = Arc::new(Mutex::new(inner));
        let receiver = tokio::spawn(receiver_loop(framed, Arc::clone(&inner)));

        Ok(Self {
            inner,
            writer: Arc::new(tokio::sync::Mutex::new(Box::new(write_half))),
            receiver: Arc::new(Mutex::new(Some(receiver))),
            idle_done: Arc::new(Notify::new()),
            config,
        })
    }

    fn lock(&self) -> MutexGuard<'_, SessionInner> {
        self.inner.lock().expect("session state lock poisoned")
    }

    pub fn state(&self) -> ConnectionState {
        self.lock().state
    }

    /// The most recently advertised capabilities, if any were seen.
    pub fn capabilities(&self) -> Option<Vec<Capability>> {
        self.lock().capabilities.clone()
    }

    pub fn has_capability(&self, name: &str) -> bool {
        self.lock()
            .capabilities
            .as_deref()
            .unwrap_or_default()
            .iter()
            .any(|capability| capability.is(name))
    }

    /// Everything recorded under `name` so far, oldest first.
    pub fn responses(&self, name: &str) -> Vec<ResponseData> {
        self.lock().registry.get(name).to_vec()
    }

    /// Remove and return everything recorded under `name`.
    pub fn clear_responses(&self, name: &str) -> Vec<ResponseData> {
        self.lock().registry.clear(name)
    }

    /// Remove and return the whole registry content.
    pub fn clear_all_responses(&self) -> HashMap<String, Vec<ResponseData>> {
        self.lock().registry.clear_all()
    }

    /// Remove and return the entries under `name` matched by `predicate`.
    pub fn extract_responses<F>(&self, name: &str, predicate: F) -> Vec<ResponseData>
    where
        F: FnMut(&ResponseData) -> bool,
    {
        self.lock().registry.extract(name, predicate)
    }

    /// Register a handler invoked by the receiver task for every response.
    ///
    /// Handlers run while the session lock is held: they must not call
    /// back into the session and should return quickly.
    pub fn add_response_handler<F>(&self, handler: F) -> HandlerId
    where
        F: FnMut(&Response) + Send + 'static,
    {
        let mut inner = self.lock();
        let id = HandlerId(inner.next_handler_id);
        inner.next_handler_id += 1;
        inner.handlers.push((id, Box::new(handler)));
        id
    }

    pub fn remove_response_handler(&self, id: HandlerId) {
        self.lock().handlers.retain(|(handler_id, _)| *handler_id != id);
    }

    /// Issue `name` with `args` and wait for its tagged completion.
    ///
    /// `NO` and `BAD` completions are turned into errors; the connection
    /// stays usable after either.
    pub async fn send_command(
        &self,
        name: &str,
        args: Vec<Argument>,
    ) -> Result<TaggedResponse, Error> {
        let (tag, receiver) = self.register(name)?;
        let command = match Command::new(tag.clone(), name, args) {
            Ok(command) => command,
            Err(error) => {
                self.lock().pending.remove(tag.inner());
                return Err(error.into());
            }
        };

        if let Err(error) = self.transmit(&command).await {
            self.lock().pending.remove(command.tag.inner());
            return Err(error);
        }

        self.finish(receiver.await)
    }

    /// Like [`Session::send_command`], but with a handler observing every
    /// response received while the command is in flight.
    pub async fn send_command_with_handler<F>(
        &self,
        name: &str,
        args: Vec<Argument>,
        handler: F,
    ) -> Result<TaggedResponse, Error>
    where
        F: FnMut(&Response) + Send + 'static,
    {
        let id = self.add_response_handler(handler);
        let result = self.send_command(name, args).await;
        self.remove_response_handler(id);

        result
    }

    /// `CAPABILITY`. Drains the accumulated `CAPABILITY` data and refreshes
    /// the cache from the most recent advertisement.
    pub async fn capability(&self) -> Result<Vec<Capability>, Error> {
        let tagged = self.send_command("CAPABILITY", vec![]).await?;

        let advertised = self
            .clear_responses("CAPABILITY")
            .into_iter()
            .rev()
            .find_map(|entry| match entry {
                ResponseData::Data(Data::Capability(caps))
                | ResponseData::Code(Code::Capability(caps)) => Some(caps),
                _ => None,
            });

        let mut inner = self.lock();
        if let Some(caps) = advertised {
            inner.capabilities = Some(caps);
        } else if let Some(Code::Capability(caps)) = &tagged.code {
            inner.capabilities = Some(caps.clone());
        }

        Ok(inner.capabilities.clone().unwrap_or_default())
    }

    pub async fn noop(&self) -> Result<TaggedResponse, Error> {
        self.send_command("NOOP", vec![]).await
    }

    /// `LOGIN <user> <password>`.
    ///
    /// On success the cached capabilities are discarded (the server may
    /// advertise a different set once authenticated) and re-primed from a
    /// `[CAPABILITY ..]` code on the completion, if present.
    pub async fn login(&self, user: &str, password: &str) -> Result<TaggedResponse, Error> {
        let tagged = self
            .send_command(
                "LOGIN",
                vec![Argument::string(user)?, Argument::string(password)?],
            )
            .await?;

        self.after_authentication(&tagged);

        Ok(tagged)
    }

    /// `AUTHENTICATE <mechanism>` with a challenge-response exchange.
    ///
    /// `authenticator` is called with each decoded server challenge and
    /// returns the raw client response; base64 framing is handled here.
    pub async fn authenticate<F>(
        &self,
        mechanism: &str,
        mut authenticator: F,
    ) -> Result<TaggedResponse, Error>
    where
        F: FnMut(&[u8]) -> Vec<u8>,
    {
        let (tag, mut receiver) = self.register("AUTHENTICATE")?;
        let args = match Argument::atom(mechanism) {
            Ok(mechanism) => vec![mechanism],
            Err(error) => {
                self.lock().pending.remove(tag.inner());
                return Err(error.into());
            }
        };
        let command = Command::new(tag, "AUTHENTICATE", args)?;

        // The slot must be armed before the command goes out: the server
        // may answer with its challenge before we get around to waiting.
        let mut continuation = self.arm_continuation()?;

        if let Err(error) = self.transmit(&command).await {
            let mut inner = self.lock();
            inner.pending.remove(command.tag.inner());
            inner.continuation = None;
            return Err(error);
        }

        let outcome = loop {
            let request = tokio::select! {
                result = &mut receiver => {
                    self.lock().continuation = None;
                    break result;
                }
                request = &mut continuation => request,
            };

            let Ok(request) = request else {
                // The continuation slot was torn down; the completion (or
                // the fatal error) is on its way.
                break receiver.await;
            };

            let challenge = BASE64.decode(request.text.trim()).unwrap_or_default();
            let reply = BASE64.encode(authenticator(&challenge));

            // Re-arm for the next round before the reply goes out.
            continuation = self.arm_continuation()?;

            let mut writer = self.writer.lock().await;
            writer.write_all(reply.as_bytes()).await?;
            writer.write_all(b"\r\n").await?;
            writer.flush().await?;
        };

        let tagged = self.finish(outcome)?;
        self.after_authentication(&tagged);

        Ok(tagged)
    }

    /// `SELECT <mailbox>`. Clears the registry first, as all accumulated
    /// data refers to the previously selected mailbox.
    pub async fn select(&self, mailbox: &str) -> Result<TaggedResponse, Error> {
        self.select_with("SELECT", mailbox).await
    }

    /// `EXAMINE <mailbox>`, i.e., read-only SELECT.
    pub async fn examine(&self, mailbox: &str) -> Result<TaggedResponse, Error> {
        self.select_with("EXAMINE", mailbox).await
    }

    async fn select_with(&self, name: &str, mailbox: &str) -> Result<TaggedResponse, Error> {
        self.lock().registry.clear_all();

        let result = self
            .send_command(name, vec![Argument::string(mailbox)?])
            .await;

        let mut inner = self.lock();
        match &result {
            Ok(_) => inner.transition(ConnectionState::Selected),
            // A failed SELECT deselects any previously selected mailbox.
            Err(Error::CommandRejected(_)) | Err(Error::ProtocolViolation(_)) => {
                inner.deselect()
            }
            Err(_) => {}
        }

        result
    }

    /// `CLOSE`: expunge and deselect.
    pub async fn close(&self) -> Result<TaggedResponse, Error> {
        let tagged = self.send_command("CLOSE", vec![]).await?;
        self.lock().deselect();
        Ok(tagged)
    }

    /// `UNSELECT`: deselect without expunging. Requires the `UNSELECT`
    /// capability.
    pub async fn unselect(&self) -> Result<TaggedResponse, Error> {
        let tagged = self.send_command("UNSELECT", vec![]).await?;
        self.lock().deselect();
        Ok(tagged)
    }

    /// `SEARCH <criteria>`. Returns the matching sequence numbers.
    pub async fn search(&self, criteria: &str) -> Result<Vec<NonZeroU32>, Error> {
        self.send_command("SEARCH", vec![Argument::raw(criteria)?])
            .await?;

        let found = self
            .clear_responses("SEARCH")
            .into_iter()
            .rev()
            .find_map(|entry| match entry {
                ResponseData::Data(Data::Search(numbers)) => Some(numbers),
                _ => None,
            });

        Ok(found.unwrap_or_default())
    }

    /// `FETCH <sequence-set> <items>`. Returns the accumulated FETCH data,
    /// one entry per message.
    pub async fn fetch(
        &self,
        sequence_set: &str,
        items: &str,
    ) -> Result<Vec<Data>, Error> {
        self.send_command(
            "FETCH",
            vec![Argument::sequence_set(sequence_set)?, Argument::raw(items)?],
        )
        .await?;

        let fetched = self
            .clear_responses("FETCH")
            .into_iter()
            .filter_map(|entry| match entry {
                ResponseData::Data(data @ Data::Fetch { .. }) => Some(data),
                _ => None,
            })
            .collect();

        Ok(fetched)
    }

    /// `LOGOUT`. The server replies with an untagged `BYE` followed by the
    /// tagged completion, then closes the connection.
    pub async fn logout(&self) -> Result<TaggedResponse, Error> {
        let (tag, receiver) = self.register("LOGOUT")?;
        self.lock().logout_tag = Some(tag.inner().to_string());

        let command = Command::new(tag, "LOGOUT", vec![])?;

        if let Err(error) = self.transmit(&command).await {
            let mut inner = self.lock();
            inner.pending.remove(command.tag.inner());
            inner.logout_tag = None;
            return Err(error);
        }

        let tagged = self.finish(receiver.await)?;
        self.lock().transition(ConnectionState::Logout);

        Ok(tagged)
    }

    /// `IDLE`, then wait.
    ///
    /// Waits until `duration` elapses (forever when `None`) or another
    /// task calls [`Session::idle_done`], then terminates the idle with
    /// `DONE`. Returns `Ok(None)` when the server does not answer the
    /// `DONE` within [`SessionConfig::idle_response_timeout`].
    pub async fn idle(&self, duration: Option<Duration>) -> Result<Option<TaggedResponse>, Error> {
        let (tag, mut receiver) = self.register("IDLE")?;
        let command = Command::new(tag, "IDLE", vec![])?;

        let continuation = self.arm_continuation()?;

        if let Err(error) = self.transmit(&command).await {
            let mut inner = self.lock();
            inner.pending.remove(command.tag.inner());
            inner.continuation = None;
            return Err(error);
        }

        // One timer across both waits, so `duration` bounds the whole
        // idle, continuation included.
        let expired = async {
            match duration {
                Some(duration) => tokio::time::sleep(duration).await,
                None => std::future::pending().await,
            }
        };
        tokio::pin!(expired);

        let continued = tokio::select! {
            // Completed without a continuation: the server refused to idle.
            result = &mut receiver => {
                self.lock().continuation = None;
                return self.finish(result).map(Some);
            }
            request = continuation => Some(request.is_ok()),
            _ = &mut expired => None,
        };

        match continued {
            // The slot was torn down; the completion is on its way.
            Some(false) => return self.finish(receiver.await).map(Some),
            Some(true) => {
                tokio::select! {
                    result = &mut receiver => {
                        // The connection died (or the server ended the
                        // command) while idling.
                        return self.finish(result).map(Some);
                    }
                    _ = self.idle_done.notified() => {}
                    _ = &mut expired => {}
                }
            }
            // The duration elapsed before the server accepted; terminate
            // the command anyway.
            None => self.lock().continuation = None,
        }

        {
            let mut writer = self.writer.lock().await;
            log::debug!("C: DONE");
            writer.write_all(b"DONE\r\n").await?;
            writer.flush().await?;
        }

        match tokio::time::timeout(self.config.idle_response_timeout, receiver).await {
            Ok(result) => self.finish(result).map(Some),
            // The completion is late; it will be discarded on arrival.
            Err(_) => Ok(None),
        }
    }

    /// Wake up a task blocked in [`Session::idle`] so it sends `DONE`.
    pub fn idle_done(&self) {
        self.idle_done.notify_one();
    }

    /// Shut down the transport and wait for the receiver task to finish.
    ///
    /// Safe to call at any time; commands issued afterwards fail with
    /// [`Error::ConnectionClosed`].
    pub async fn disconnect(&self) -> Result<(), Error> {
        {
            let mut writer = self.writer.lock().await;
            // The peer may already be gone; that is fine.
            let _ = writer.shutdown().await;
        }

        let receiver = self
            .receiver
            .lock()
            .expect("receiver handle lock poisoned")
            .take();

        if let Some(receiver) = receiver {
            let _ = receiver.await;
        }

        let mut inner = self.lock();
        // The disconnect was deliberate: whatever the receiver recorded
        // when the transport went away is not an error to replay.
        inner.fatal = None;
        inner.close_cleanly();

        Ok(())
    }

    /// Allocate a tag and park a waiter for its completion.
    fn register(
        &self,
        name: &str,
    ) -> Result<(Tag, oneshot::Receiver<Result<TaggedResponse, FatalError>>), Error> {
        let mut inner = self.lock();

        // A recorded fatal error takes precedence over the logout state:
        // `fail_all` forces Logout, and callers arriving afterwards must
        // still see the original failure.
        if let Some(fatal) = &inner.fatal {
            return Err(fatal.clone().into());
        }
        if inner.state == ConnectionState::Logout {
            return Err(Error::ConnectionClosed);
        }

        inner.tag_counter += 1;
        let tag = format!("{}{:04}", self.config.tag_prefix, inner.tag_counter);
        let tag = Tag::try_from(tag).map_err(EncodeError::from)?;

        log::debug!("dispatch {} {}", tag.inner(), name);

        let (sender, receiver) = oneshot::channel();
        inner.pending.insert(tag.inner().to_string(), sender);

        Ok((tag, receiver))
    }

    /// Arm the continuation slot. Must happen before the line soliciting
    /// the continuation is transmitted, or the request can be lost.
    fn arm_continuation(&self) -> Result<oneshot::Receiver<ContinueRequest>, Error> {
        let mut inner = self.lock();

        if let Some(fatal) = &inner.fatal {
            return Err(fatal.clone().into());
        }

        let (sender, receiver) = oneshot::channel();
        inner.continuation = Some(sender);

        Ok(receiver)
    }

    /// Write the command fragments, pausing for a continuation request
    /// before each literal. The writer lock is held for the whole command
    /// so concurrent senders cannot interleave fragments.
    async fn transmit(&self, command: &Command) -> Result<(), Error> {
        let fragments: Vec<Fragment> = command.encode().collect();
        let mut writer = self.writer.lock().await;

        for (i, fragment) in fragments.iter().enumerate() {
            match fragment {
                Fragment::Line { data } => {
                    let awaits_literal =
                        matches!(fragments.get(i + 1), Some(Fragment::Literal { .. }));
                    let continuation = if awaits_literal {
                        Some(self.arm_continuation()?)
                    } else {
                        None
                    };

                    log::debug!("C: {}", String::from_utf8_lossy(data).trim_end());
                    writer.write_all(data).await?;
                    writer.flush().await?;

                    if let Some(continuation) = continuation {
                        continuation
                            .await
                            .map_err(|_| self.fatal_or_closed())?;
                    }
                }
                Fragment::Literal { data } => {
                    writer.write_all(data).await?;
                }
            }
        }

        writer.flush().await?;

        Ok(())
    }

    fn fatal_or_closed(&self) -> Error {
        match &self.lock().fatal {
            Some(fatal) => fatal.clone().into(),
            None => Error::ConnectionClosed,
        }
    }

    /// Turn the waiter outcome into the command result.
    fn finish(
        &self,
        outcome: Result<Result<TaggedResponse, FatalError>, oneshot::error::RecvError>,
    ) -> Result<TaggedResponse, Error> {
        let tagged = outcome
            .map_err(|_| self.fatal_or_closed())?
            .map_err(Error::from)?;

        match tagged.status {
            TaggedStatus::Ok => Ok(tagged),
            TaggedStatus::No => Err(Error::CommandRejected(tagged)),
            TaggedStatus::Bad => Err(Error::ProtocolViolation(tagged)),
            TaggedStatus::Other(_) => Err(Error::InvalidTaggedResponse(tagged.to_string())),
        }
    }

    /// Post-LOGIN/AUTHENTICATE bookkeeping: capabilities advertised before
    /// authentication no longer apply.
    fn after_authentication(&self, tagged: &TaggedResponse) {
        let mut inner = self.lock();

        inner.capabilities = match &tagged.code {
            Some(Code::Capability(caps)) => Some(caps.clone()),
            _ => None,
        };
        inner.transition(ConnectionState::Authenticated);
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.lock();
        f.debug_struct("Session")
            .field("state", &inner.state)
            .field("pending", &inner.pending.len())
            .finish_non_exhaustive()
    }
}

/// The receiver task: the only reader of the transport.
///
/// Decodes response units, records untagged data, resolves tagged waiters,
/// and routes continuation requests. Runs until the stream ends or a
/// connection-fatal condition arises, then replays the failure to every
/// blocked and future caller.
async fn receiver_loop<R>(
    mut framed: FramedRead<R, ResponseCodec>,
    inner: Arc<Mutex<SessionInner>>,
) where
    R: AsyncRead + Unpin,
{
    let fatal = loop {
        let item = match framed.next().await {
            Some(item) => item,
            // EOF.
            None => {
                let logout = {
                    let inner = inner.lock().expect("session state lock poisoned");
                    inner.logout_tag.is_some() || inner.state == ConnectionState::Logout
                };

                if logout {
                    break None;
                }
                break Some(FatalError::UnexpectedDisconnect(
                    "connection closed by server".into(),
                ));
            }
        };

        match item {
            Ok(response) => {
                log::debug!("S: {response:?}");

                let mut inner = inner.lock().expect("session state lock poisoned");
                inner.run_handlers(&response);

                match response {
                    Response::Untagged(untagged) => {
                        inner.record_untagged(&untagged);

                        if let UntaggedResponse::Status {
                            condition: Condition::Bye,
                            text,
                            ..
                        } = &untagged
                        {
                            // BYE is expected while a LOGOUT is in flight;
                            // anywhere else the server is hanging up on us.
                            if inner.logout_tag.is_none() {
                                break Some(FatalError::UnexpectedDisconnect(text.clone()));
                            }
                        }
                    }
                    Response::Tagged(tagged) => {
                        let is_logout =
                            inner.logout_tag.as_deref() == Some(tagged.tag.inner());

                        // A line whose first token merely looks like a tag
                        // (garbage, or a stale reply) correlates with
                        // nothing; drop it like an unparsable unit.
                        if !is_logout && !inner.pending.contains_key(tagged.tag.inner()) {
                            log::warn!(
                                "dropping tagged response for unknown tag {}",
                                tagged.tag.inner()
                            );
                            continue;
                        }

                        if let TaggedStatus::Other(_) = tagged.status {
                            break Some(FatalError::InvalidTaggedResponse(format!(
                                "{} {}",
                                tagged.tag.inner(),
                                tagged
                            )));
                        }

                        if let Some(waiter) = inner.pending.remove(tagged.tag.inner()) {
                            // The caller may have stopped waiting.
                            let _ = waiter.send(Ok(tagged));
                        }

                        if is_logout {
                            inner.transition(ConnectionState::Logout);
                            break None;
                        }
                    }
                    Response::Continue(request) => match inner.continuation.take() {
                        Some(waiter) => {
                            let _ = waiter.send(request);
                        }
                        None => {
                            log::warn!("dropping unsolicited continuation request");
                        }
                    },
                }
            }
            Err(error) if error.is_recoverable() => {
                // The broken unit was consumed; keep the connection.
                log::warn!("dropping unparsable response: {error}");
            }
            Err(error) => {
                let fatal = match &error {
                    ResponseCodecError::Io(io) => FatalError::transport(io),
                    ResponseCodecError::Framing(FramingError::ResponseTooLarge {
                        max_response_size,
                        ..
                    }) => FatalError::ResponseTooLarge {
                        max_response_size: *max_response_size,
                    },
                    other => FatalError::OutOfSync(other.to_string()),
                };

                log::warn!("connection failed: {error}");
                break Some(fatal);
            }
        }
    };

    let mut inner = inner.lock().expect("session state lock poisoned");
    match fatal {
        Some(fatal) => inner.fail_all(fatal),
        None => inner.close_cleanly(),
    }
}
