//! Wire types for classroom events
//!
//! Inbound frames look like `{"event": "group_join", "args": ["alice", "Xy12ab34", 2]}`
//! and are decoded positionally into `ClientEvent`. Outbound frames look like
//! `{"event": "group_join_response", "data": {...}}`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::registry::Position;
use crate::error::{ClassroomError, Result};
use crate::security::sanitize_value;

/// Raw inbound frame before positional decoding
#[derive(Debug, Clone, Deserialize)]
pub struct InboundFrame {
    pub event: String,
    #[serde(default)]
    pub args: Vec<Value>,
}

/// Sanitized positional arguments of one inbound event
struct Args {
    event: String,
    values: Vec<Value>,
}

impl Args {
    fn new(frame: InboundFrame) -> Self {
        Self {
            event: frame.event,
            values: frame.args.into_iter().map(sanitize_value).collect(),
        }
    }

    fn missing(&self, name: &str) -> ClassroomError {
        ClassroomError::InvalidInput(format!("{}: missing argument '{}'", self.event, name))
    }

    fn value(&self, index: usize) -> Value {
        self.values.get(index).cloned().unwrap_or(Value::Null)
    }

    /// Required text argument; numbers are accepted and rendered as text
    fn text(&self, index: usize, name: &str) -> Result<String> {
        match self.values.get(index) {
            Some(Value::String(s)) => Ok(s.clone()),
            Some(Value::Number(n)) => Ok(n.to_string()),
            _ => Err(self.missing(name)),
        }
    }

    /// Required unsigned integer given as a number or numeric string
    fn integer(&self, index: usize, name: &str) -> Result<u64> {
        let invalid = || {
            ClassroomError::InvalidInput(format!("{}: '{}' must be a number", self.event, name))
        };
        match self.values.get(index) {
            Some(Value::Number(n)) => n.as_u64().ok_or_else(invalid),
            Some(Value::String(s)) => s.trim().parse().map_err(|_| invalid()),
            _ => Err(self.missing(name)),
        }
    }

    fn group_id(&self, index: usize) -> Result<u32> {
        let id = self.integer(index, "group_id")?;
        u32::try_from(id).map_err(|_| {
            ClassroomError::InvalidInput(format!("{}: group_id out of range", self.event))
        })
    }

    fn optional_integer(&self, index: usize) -> Option<u64> {
        self.integer(index, "id").ok()
    }

    /// Loosely-typed boolean flag; absent means false
    fn flag(&self, index: usize) -> bool {
        match self.values.get(index) {
            Some(Value::Bool(b)) => *b,
            Some(Value::Number(n)) => n.as_f64().map_or(false, |v| v != 0.0),
            Some(Value::String(s)) => !s.is_empty() && s != "false" && s != "0",
            _ => false,
        }
    }
}

/// Decoded inbound event
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    Login { username: String, class_id: String },
    Logout { username: String, class_id: String, disconnect: bool },
    GroupsGet { username: String, class_id: String },
    GroupJoin { username: String, class_id: String, group_id: u32 },
    GroupLeave { username: String, class_id: String, group_id: u32, disconnect: bool },
    GroupInfo { username: String, class_id: String, group_id: u32, status: bool },
    CoordinateChange { username: String, class_id: String, group_id: u32, info: Value, delta: Value },
    XmlChange { username: String, class_id: String, group_id: u32, xml: Value, toolbar: Value },
    GetXml { username: String, class_id: String, group_id: u32 },
    GetSettings { class_id: String, group_id: u32 },

    AddClass { class_name: String, group_count: u32, secret: String, admin_id: Option<u64> },
    JoinClass { class_id: String, secret: String },
    LeaveClass { class_id: String, secret: String, disconnect: bool },
    AddGroup { class_id: String, secret: String },
    DeleteGroup { class_id: String, group_id: u32, secret: String },
    DeleteClass { class_id: String, secret: String, disconnect: bool },
    SaveSettings { class_id: String, settings: Value, secret: String },
    GetClasses { secret: String, admin_id: Option<u64>, disconnect: bool },
    SaveToolbar { class_id: String, toolbar_name: String, tools: Value, secret: String },
    GetToolbars { class_id: String, secret: String },
    DeleteToolbar { class_id: String, toolbar_name: String, secret: String },

    CreateAdmin { username: String, password: String, secret: String },
    CheckUsername { username: String, password: String, secret: String },
    CreateSession { admin_id: u64, token: String },
    CheckSession { admin_id: u64, token: String },
    DeleteSession { admin_id: u64 },
}

impl ClientEvent {
    /// Parse and sanitize one inbound text frame
    pub fn parse(text: &str) -> Result<Self> {
        let frame: InboundFrame = serde_json::from_str(text)?;
        Self::from_frame(frame)
    }

    pub fn from_frame(frame: InboundFrame) -> Result<Self> {
        let a = Args::new(frame);

        let event = match a.event.as_str() {
            "login" => Self::Login {
                username: a.text(0, "username")?,
                class_id: a.text(1, "class_id")?,
            },
            "logout" => Self::Logout {
                username: a.text(0, "username")?,
                class_id: a.text(1, "class_id")?,
                disconnect: a.flag(2),
            },
            "groups_get" => Self::GroupsGet {
                username: a.text(0, "username")?,
                class_id: a.text(1, "class_id")?,
            },
            "group_join" => Self::GroupJoin {
                username: a.text(0, "username")?,
                class_id: a.text(1, "class_id")?,
                group_id: a.group_id(2)?,
            },
            "group_leave" => Self::GroupLeave {
                username: a.text(0, "username")?,
                class_id: a.text(1, "class_id")?,
                group_id: a.group_id(2)?,
                disconnect: a.flag(3),
            },
            "group_info" => Self::GroupInfo {
                username: a.text(0, "username")?,
                class_id: a.text(1, "class_id")?,
                group_id: a.group_id(2)?,
                status: a.flag(3),
            },
            "coordinate_change" => Self::CoordinateChange {
                username: a.text(0, "username")?,
                class_id: a.text(1, "class_id")?,
                group_id: a.group_id(2)?,
                info: a.value(3),
                delta: a.value(4),
            },
            "xml_change" => Self::XmlChange {
                username: a.text(0, "username")?,
                class_id: a.text(1, "class_id")?,
                group_id: a.group_id(2)?,
                xml: a.value(3),
                toolbar: a.value(4),
            },
            "get_xml" => Self::GetXml {
                username: a.text(0, "username")?,
                class_id: a.text(1, "class_id")?,
                group_id: a.group_id(2)?,
            },
            "get-settings" => Self::GetSettings {
                class_id: a.text(0, "class_id")?,
                group_id: a.group_id(1)?,
            },
            "add-class" => Self::AddClass {
                class_name: a.text(0, "class_name")?,
                group_count: u32::try_from(a.integer(1, "group_count")?).map_err(|_| {
                    ClassroomError::InvalidInput("add-class: group_count out of range".to_string())
                })?,
                secret: a.text(2, "secret")?,
                admin_id: a.optional_integer(3),
            },
            "join-class" => Self::JoinClass {
                class_id: a.text(0, "class_id")?,
                secret: a.text(1, "secret")?,
            },
            "leave-class" => Self::LeaveClass {
                class_id: a.text(0, "class_id")?,
                secret: a.text(1, "secret")?,
                disconnect: a.flag(2),
            },
            "add-group" => Self::AddGroup {
                class_id: a.text(0, "class_id")?,
                secret: a.text(1, "secret")?,
            },
            "delete-group" => Self::DeleteGroup {
                class_id: a.text(0, "class_id")?,
                group_id: a.group_id(1)?,
                secret: a.text(2, "secret")?,
            },
            "delete-class" => Self::DeleteClass {
                class_id: a.text(0, "class_id")?,
                secret: a.text(1, "secret")?,
                disconnect: a.flag(2),
            },
            "save-settings" => Self::SaveSettings {
                class_id: a.text(0, "class_id")?,
                settings: a.value(1),
                secret: a.text(2, "secret")?,
            },
            "get-classes" => Self::GetClasses {
                secret: a.text(0, "secret")?,
                admin_id: a.optional_integer(1),
                disconnect: a.flag(2),
            },
            "save-toolbar" => Self::SaveToolbar {
                class_id: a.text(0, "class_id")?,
                toolbar_name: a.text(1, "toolbar_name")?,
                tools: a.value(2),
                secret: a.text(3, "secret")?,
            },
            "get-toolbars" => Self::GetToolbars {
                class_id: a.text(0, "class_id")?,
                secret: a.text(1, "secret")?,
            },
            "delete-toolbar" => Self::DeleteToolbar {
                class_id: a.text(0, "class_id")?,
                toolbar_name: a.text(1, "toolbar_name")?,
                secret: a.text(2, "secret")?,
            },
            "create-admin" => Self::CreateAdmin {
                username: a.text(0, "username")?,
                password: a.text(1, "password")?,
                secret: a.text(2, "secret")?,
            },
            "check-username" => Self::CheckUsername {
                username: a.text(0, "username")?,
                password: a.text(1, "password")?,
                secret: a.text(2, "secret")?,
            },
            "create-session" => Self::CreateSession {
                admin_id: a.integer(0, "admin_id")?,
                token: a.text(1, "token")?,
            },
            "check-session" => Self::CheckSession {
                admin_id: a.integer(0, "admin_id")?,
                token: a.text(1, "token").unwrap_or_default(),
            },
            "delete-session" => Self::DeleteSession {
                admin_id: a.integer(0, "admin_id")?,
            },
            other => {
                return Err(ClassroomError::MessageParseError(format!(
                    "Unknown event: {}",
                    other
                )))
            }
        };

        Ok(event)
    }

    /// Event name used in logs
    pub fn name(&self) -> &'static str {
        match self {
            Self::Login { .. } => "login",
            Self::Logout { .. } => "logout",
            Self::GroupsGet { .. } => "groups_get",
            Self::GroupJoin { .. } => "group_join",
            Self::GroupLeave { .. } => "group_leave",
            Self::GroupInfo { .. } => "group_info",
            Self::CoordinateChange { .. } => "coordinate_change",
            Self::XmlChange { .. } => "xml_change",
            Self::GetXml { .. } => "get_xml",
            Self::GetSettings { .. } => "get-settings",
            Self::AddClass { .. } => "add-class",
            Self::JoinClass { .. } => "join-class",
            Self::LeaveClass { .. } => "leave-class",
            Self::AddGroup { .. } => "add-group",
            Self::DeleteGroup { .. } => "delete-group",
            Self::DeleteClass { .. } => "delete-class",
            Self::SaveSettings { .. } => "save-settings",
            Self::GetClasses { .. } => "get-classes",
            Self::SaveToolbar { .. } => "save-toolbar",
            Self::GetToolbars { .. } => "get-toolbars",
            Self::DeleteToolbar { .. } => "delete-toolbar",
            Self::CreateAdmin { .. } => "create-admin",
            Self::CheckUsername { .. } => "check-username",
            Self::CreateSession { .. } => "create-session",
            Self::CheckSession { .. } => "check-session",
            Self::DeleteSession { .. } => "delete-session",
        }
    }
}

/// One student as seen by group peers and the instructor console
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberInfo {
    pub member_name: String,
    pub member_info: Value,
    pub position: Position,
    pub group_id: u32,
}

/// Member count of one group
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupSummary {
    pub grp_name: u32,
    pub num: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoginPayload {
    pub username: String,
    pub class_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogoutPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    pub class_id: String,
    pub disconnect: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupsPayload {
    pub username: String,
    pub class_id: String,
    pub groups: Vec<GroupSummary>,
}

/// Shared by group_join, group_leave and group_numbers responses
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MembershipPayload {
    pub username: String,
    pub class_id: String,
    pub group_id: u32,
    pub status: bool,
    pub disconnect: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_size: Option<usize>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub other_members: Vec<MemberInfo>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupInfoPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    pub class_id: String,
    pub group_id: u32,
    pub status: bool,
    pub disconnect: bool,
    pub other_members: Vec<MemberInfo>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoordinatePayload {
    pub username: String,
    pub class_id: String,
    pub group_id: u32,
    pub info: Value,
    pub position: Position,
    pub other_members: Vec<MemberInfo>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct XmlPayload {
    pub username: String,
    pub class_id: String,
    pub group_id: u32,
    pub xml: Value,
    pub toolbar: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettingsPayload {
    pub class_id: String,
    pub settings: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassPayload {
    pub class_id: String,
    pub class_name: String,
    pub group_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupListPayload {
    pub class_id: String,
    pub groups: Vec<GroupSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassClosedPayload {
    pub class_id: String,
    pub disconnect: bool,
}

/// Class row in a get-classes listing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassListing {
    /// External handle, absent when the class is not loaded in memory
    pub class_id: Option<String>,
    pub class_name: String,
    pub admin_id: Option<u64>,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassListPayload {
    pub classes: Vec<ClassListing>,
    pub disconnect: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolbarPayload {
    pub username: String,
    pub class_id: String,
    pub toolbars: Vec<crate::storage::ToolbarRecord>,
}

/// Answer to create-admin, check-username and check-session.
/// `check` is 1 for success, 0 for unknown/absent, -1 for rejected/expired.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    pub admin_id: Option<u64>,
    pub check: i8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub message: String,
}

/// Server-to-client events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerEvent {
    #[serde(rename = "login_response")]
    LoginResponse(LoginPayload),
    #[serde(rename = "logout_response")]
    LogoutResponse(LogoutPayload),
    #[serde(rename = "groups_get_response")]
    GroupsGetResponse(GroupsPayload),
    #[serde(rename = "group_join_response")]
    GroupJoinResponse(MembershipPayload),
    #[serde(rename = "group_leave_response")]
    GroupLeaveResponse(MembershipPayload),
    #[serde(rename = "group_numbers_response")]
    GroupNumbersResponse(MembershipPayload),
    #[serde(rename = "group_info_response")]
    GroupInfoResponse(GroupInfoPayload),
    #[serde(rename = "coordinate_change_response")]
    CoordinateChangeResponse(CoordinatePayload),
    #[serde(rename = "xml_change_response")]
    XmlChangeResponse(XmlPayload),
    #[serde(rename = "get_xml_response")]
    GetXmlResponse(XmlPayload),
    #[serde(rename = "get-settings-response")]
    GetSettingsResponse(SettingsPayload),
    #[serde(rename = "add-class-response")]
    AddClassResponse(ClassPayload),
    #[serde(rename = "add-group-response")]
    AddGroupResponse(GroupListPayload),
    #[serde(rename = "delete-group-response")]
    DeleteGroupResponse(GroupListPayload),
    #[serde(rename = "leave-class-response")]
    LeaveClassResponse(ClassClosedPayload),
    #[serde(rename = "delete-class-response")]
    DeleteClassResponse(ClassClosedPayload),
    #[serde(rename = "delete-student-class-response")]
    DeleteStudentClassResponse(ClassClosedPayload),
    #[serde(rename = "get-classes-response")]
    GetClassesResponse(ClassListPayload),
    #[serde(rename = "get-toolbar-response")]
    GetToolbarResponse(ToolbarPayload),
    #[serde(rename = "delete-toolbar-response")]
    DeleteToolbarResponse(ToolbarPayload),
    #[serde(rename = "create-admin-response")]
    CreateAdminResponse(CheckPayload),
    #[serde(rename = "check-username-response")]
    CheckUsernameResponse(CheckPayload),
    #[serde(rename = "check-session-response")]
    CheckSessionResponse(CheckPayload),
    #[serde(rename = "server_error")]
    ServerError(ErrorPayload),
}

impl ServerEvent {
    pub fn server_error(message: impl Into<String>) -> Self {
        Self::ServerError(ErrorPayload {
            message: message.into(),
        })
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}
