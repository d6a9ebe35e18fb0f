use serde::{Deserialize, Serialize};

/// WireMessage is the one logical shape shared by every client command, reply and push.
///
/// `msg_ids` and `limit` only travel in JSON. The binary form carries the five fixed fields.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireMessage {
    pub cmd: String,
    #[serde(default, alias = "from")]
    pub src: String,
    #[serde(default)]
    pub to: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub error: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub msg_ids: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
}

impl WireMessage {
    pub fn new(cmd: impl Into<String>) -> Self {
        WireMessage {
            cmd: cmd.into(),
            ..Default::default()
        }
    }

    pub fn with_src(mut self, src: impl Into<String>) -> Self {
        self.src = src.into();
        self
    }

    pub fn with_to(mut self, to: impl Into<String>) -> Self {
        self.to = to.into();
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_msg_id(mut self, msg_id: impl Into<String>) -> Self {
        self.msg_ids = Some(msg_id.into());
        self
    }

    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn into_error(mut self) -> Self {
        self.error = true;
        self
    }
}
