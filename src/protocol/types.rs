use crate::error::{ClusterError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Range;

/// Width of the resource name field in a frame.
pub const RESOURCE_NAME_LEN: usize = 100;

pub const LOAD_BALANCER_CHANNEL: Channel = 4000;
pub const PRIMARY_SERVER_CHANNEL: Channel = 4001;
pub const SECONDARY_CHANNEL_BASE: Channel = 4002;
pub const MAX_SECONDARIES: usize = 8;

/// Channel numbers owned by server roles. No session may use one.
pub const RESERVED_CHANNELS: Range<Channel> =
    LOAD_BALANCER_CHANNEL..SECONDARY_CHANNEL_BASE + MAX_SECONDARIES as Channel;

/// Terminates a traversal sequence in the staging area.
pub const TRAVERSAL_SENTINEL: i32 = -1;

/// A logical address on the message bus.
pub type Channel = u64;

/// Caller-chosen identifier of one client; doubles as its private reply channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

impl SessionId {
    /// Session used by the cluster itself for control traffic (Cleanup).
    pub const CONTROL: SessionId = SessionId(u64::MAX);

    /// Validates a raw session number.
    ///
    /// Zero, the reserved server channels and the control session are rejected
    /// so that a reply channel can never collide with a server's inbox.
    pub fn new(raw: u64) -> Result<Self> {
        if raw == 0 {
            return Err(ClusterError::protocol("session id must be non-zero"));
        }
        if RESERVED_CHANNELS.contains(&raw) {
            return Err(ClusterError::protocol(format!(
                "session id {} collides with a reserved server channel",
                raw
            )));
        }
        if raw == Self::CONTROL.0 {
            return Err(ClusterError::protocol("session id is reserved for control traffic"));
        }
        Ok(Self(raw))
    }

    pub fn get(self) -> u64 {
        self.0
    }

    pub fn reply_channel(self) -> Channel {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Well-known channel of the `index`-th secondary server.
pub fn secondary_channel(index: usize) -> Channel {
    SECONDARY_CHANNEL_BASE + index as Channel
}

/// Deterministic secondary affinity for a session.
///
/// With two secondaries this is a parity rule: odd sessions go to
/// the first instance, even sessions to the second.
pub fn secondary_for_session(session: SessionId, secondaries: usize) -> Channel {
    let count = secondaries.clamp(1, MAX_SECONDARIES) as u64;
    SECONDARY_CHANNEL_BASE + (session.get().wrapping_sub(1) % count)
}

/// Operation codes carried by an envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i64)]
pub enum Operation {
    /// Marks a server answer; never used for requests.
    Reply = 0,
    /// Write a new graph.
    AddGraph = 1,
    /// Overwrite an existing graph.
    ModifyGraph = 2,
    /// Depth-first traversal from a staged start vertex.
    Traverse = 3,
    /// Accepted by secondaries and ignored.
    NoOp = 4,
    /// Drain outstanding workers and stop.
    Cleanup = 5,
}

impl Operation {
    pub fn code(self) -> i64 {
        self as i64
    }

    pub fn is_write(self) -> bool {
        matches!(self, Operation::AddGraph | Operation::ModifyGraph)
    }
}

impl TryFrom<i64> for Operation {
    type Error = ClusterError;

    fn try_from(code: i64) -> Result<Self> {
        match code {
            0 => Ok(Operation::Reply),
            1 => Ok(Operation::AddGraph),
            2 => Ok(Operation::ModifyGraph),
            3 => Ok(Operation::Traverse),
            4 => Ok(Operation::NoOp),
            5 => Ok(Operation::Cleanup),
            other => Err(ClusterError::protocol(format!(
                "unknown operation code {}",
                other
            ))),
        }
    }
}

/// Name of a durable graph resource.
///
/// Bounded to `RESOURCE_NAME_LEN` bytes and restricted to a single path
/// component, since it is used directly as a file name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceName(String);

impl ResourceName {
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        if name.is_empty() {
            return Err(ClusterError::protocol("resource name is empty"));
        }
        if name.len() > RESOURCE_NAME_LEN {
            return Err(ClusterError::protocol(format!(
                "resource name is {} bytes, limit is {}",
                name.len(),
                RESOURCE_NAME_LEN
            )));
        }
        if name == "." || name == ".." || name.contains(&['/', '\\', '\0'][..]) {
            return Err(ClusterError::protocol(format!(
                "resource name '{}' is not a plain file name",
                name.escape_default()
            )));
        }
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Outcome carried by an envelope. Requests always carry `Ok`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok,
    Failed { code: u16, retryable: bool },
}

impl Status {
    pub fn from_error(err: &ClusterError) -> Self {
        Status::Failed {
            code: err.status_code(),
            retryable: err.is_retryable(),
        }
    }

    pub fn into_result(self) -> Result<()> {
        match self {
            Status::Ok => Ok(()),
            Status::Failed { code, retryable } => Err(ClusterError::Remote { code, retryable }),
        }
    }
}

/// The request/response envelope shared by every role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    /// Destination address.
    pub channel: Channel,
    pub session: SessionId,
    /// Per-session request counter, echoed by the reply. Zero for control traffic.
    pub request_id: u64,
    pub operation: Operation,
    pub resource: Option<ResourceName>,
    /// Number of int32 words the requester staged for this session.
    pub payload_size_hint: u32,
    pub status: Status,
}

impl Envelope {
    pub fn request(
        channel: Channel,
        session: SessionId,
        operation: Operation,
        resource: ResourceName,
        payload_size_hint: u32,
    ) -> Self {
        Self {
            channel,
            session,
            request_id: 0,
            operation,
            resource: Some(resource),
            payload_size_hint,
            status: Status::Ok,
        }
    }

    /// Cleanup addressed to a server's well-known channel.
    pub fn cleanup(channel: Channel) -> Self {
        Self {
            channel,
            session: SessionId::CONTROL,
            request_id: 0,
            operation: Operation::Cleanup,
            resource: None,
            payload_size_hint: 0,
            status: Status::Ok,
        }
    }

    /// The answer to this request, addressed to the session's private channel.
    pub fn reply(&self, status: Status) -> Self {
        Self {
            channel: self.session.reply_channel(),
            session: self.session,
            request_id: self.request_id,
            operation: Operation::Reply,
            resource: self.resource.clone(),
            payload_size_hint: 0,
            status,
        }
    }

    /// Tags this request with the sender's request counter.
    pub fn with_request_id(mut self, request_id: u64) -> Self {
        self.request_id = request_id;
        self
    }

    pub fn is_reply_for(&self, session: SessionId) -> bool {
        self.operation == Operation::Reply
            && self.session == session
            && self.channel == session.reply_channel()
    }

    /// Copy of this envelope readdressed to `channel`.
    pub fn forwarded_to(&self, channel: Channel) -> Self {
        Self {
            channel,
            ..self.clone()
        }
    }

    pub fn resource_name(&self) -> Result<&ResourceName> {
        self.resource.as_ref().ok_or_else(|| {
            ClusterError::protocol(format!(
                "{:?} request from session {} carries no resource name",
                self.operation, self.session
            ))
        })
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        let frame = EnvelopeFrame::from(self);
        Ok(bincode::serialize(&frame)?)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let frame: EnvelopeFrame = bincode::deserialize(bytes)?;
        Envelope::try_from(frame)
    }
}

/// Fixed-layout wire form of an envelope.
///
/// The name is NUL-padded to `RESOURCE_NAME_LEN`, so every frame encodes to
/// `FRAME_LEN` bytes.
#[derive(Debug, Serialize, Deserialize)]
struct EnvelopeFrame {
    channel: u64,
    session_id: u64,
    request_id: u64,
    operation: i64,
    resource_name: Vec<u8>,
    payload_size_hint: u32,
    status_code: u16,
    retryable: bool,
}

/// Encoded size of every envelope frame.
pub const FRAME_LEN: usize = 8 + 8 + 8 + 8 + (8 + RESOURCE_NAME_LEN) + 4 + 2 + 1;

impl From<&Envelope> for EnvelopeFrame {
    fn from(envelope: &Envelope) -> Self {
        let mut resource_name = vec![0u8; RESOURCE_NAME_LEN];
        if let Some(name) = &envelope.resource {
            let bytes = name.as_str().as_bytes();
            resource_name[..bytes.len()].copy_from_slice(bytes);
        }

        let (status_code, retryable) = match envelope.status {
            Status::Ok => (0, false),
            Status::Failed { code, retryable } => (code, retryable),
        };

        Self {
            channel: envelope.channel,
            session_id: envelope.session.get(),
            request_id: envelope.request_id,
            operation: envelope.operation.code(),
            resource_name,
            payload_size_hint: envelope.payload_size_hint,
            status_code,
            retryable,
        }
    }
}

impl TryFrom<EnvelopeFrame> for Envelope {
    type Error = ClusterError;

    fn try_from(frame: EnvelopeFrame) -> Result<Self> {
        if frame.resource_name.len() != RESOURCE_NAME_LEN {
            return Err(ClusterError::protocol(format!(
                "resource name field is {} bytes, expected {}",
                frame.resource_name.len(),
                RESOURCE_NAME_LEN
            )));
        }

        let operation = Operation::try_from(frame.operation)?;

        let session = if frame.session_id == SessionId::CONTROL.get() {
            SessionId::CONTROL
        } else {
            SessionId::new(frame.session_id)?
        };

        let end = frame
            .resource_name
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(RESOURCE_NAME_LEN);
        let resource = if end == 0 {
            None
        } else {
            let name = std::str::from_utf8(&frame.resource_name[..end])
                .map_err(|e| ClusterError::protocol(format!("resource name is not UTF-8: {}", e)))?;
            Some(ResourceName::new(name)?)
        };

        let status = match frame.status_code {
            0 => Status::Ok,
            code => Status::Failed {
                code,
                retryable: frame.retryable,
            },
        };

        Ok(Envelope {
            channel: frame.channel,
            session,
            request_id: frame.request_id,
            operation,
            resource,
            payload_size_hint: frame.payload_size_hint,
            status,
        })
    }
}
