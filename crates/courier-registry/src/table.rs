//! The built-in operation table.
//!
//! One entry per operation the bridge exposes, grouped by risk class.
//! Built once at process start; never mutated afterwards.

use std::collections::HashMap;

use courier_core::{ApprovalMode, RiskLevel};

use crate::descriptor::{AuthOp, Binding, MethodDescriptor, ParamKind, ParamSpec};

use ApprovalMode::{Auto, Confirm};
use ParamKind::{Array, Boolean, Integer, String as Str};
use RiskLevel::{Destructive, Read, Write};

const fn req(name: &'static str, kind: ParamKind) -> ParamSpec {
    ParamSpec::required(name, kind)
}

const fn opt(name: &'static str, kind: ParamKind) -> ParamSpec {
    ParamSpec::optional(name, kind)
}

const fn method(
    name: &'static str,
    description: &'static str,
    params: &'static [ParamSpec],
    risk: RiskLevel,
    approval: ApprovalMode,
    binding: Binding,
) -> MethodDescriptor {
    MethodDescriptor {
        name,
        description,
        params,
        risk,
        approval,
        binding,
    }
}

/// The fixed operation set.
static METHODS: &[MethodDescriptor] = &[
    // --- reads ---------------------------------------------------------
    method(
        "get_me",
        "Get the authenticated account's own profile.",
        &[],
        Read,
        Auto,
        Binding::Backend("account.get_me"),
    ),
    method(
        "get_chats",
        "List dialogs (chats, groups, channels).",
        &[
            opt("limit", Integer),
            opt("archived", Boolean),
            opt("folder_id", Integer),
        ],
        Read,
        Auto,
        Binding::Backend("dialogs.list"),
    ),
    method(
        "get_chat_info",
        "Get detailed information about a chat.",
        &[req("chat_id", Integer)],
        Read,
        Auto,
        Binding::Backend("dialogs.info"),
    ),
    method(
        "get_chat_history",
        "Fetch messages from a chat.",
        &[
            req("chat_id", Integer),
            opt("limit", Integer),
            opt("offset_id", Integer),
            opt("min_id", Integer),
            opt("max_id", Integer),
        ],
        Read,
        Auto,
        Binding::Backend("messages.history"),
    ),
    method(
        "get_folders",
        "List the account's chat folders.",
        &[],
        Read,
        Auto,
        Binding::Backend("folders.list"),
    ),
    method(
        "get_chats_from_folder",
        "List the chats assigned to one folder.",
        &[req("folder_id", Integer)],
        Read,
        Auto,
        Binding::Backend("folders.chats"),
    ),
    method(
        "get_forum_topics",
        "List forum topics in a chat.",
        &[req("chat_id", Integer), opt("limit", Integer)],
        Read,
        Auto,
        Binding::Backend("chats.forum_topics"),
    ),
    method(
        "get_chat_admins",
        "List administrators of a group or channel.",
        &[req("chat_id", Integer)],
        Read,
        Auto,
        Binding::Backend("chats.admins"),
    ),
    method(
        "check_chat_invite",
        "Preview a chat behind an invite link without joining.",
        &[req("invite_link", Str)],
        Read,
        Auto,
        Binding::Backend("chats.check_invite"),
    ),
    method(
        "get_chat_members",
        "List members of a group or channel.",
        &[
            req("chat_id", Integer),
            opt("limit", Integer),
            opt("search", Str),
        ],
        Read,
        Auto,
        Binding::Backend("chats.members"),
    ),
    method(
        "get_contacts",
        "List the account's contacts.",
        &[],
        Read,
        Auto,
        Binding::Backend("contacts.list"),
    ),
    method(
        "search_chats",
        "Search dialogs by title or username.",
        &[req("query", Str), opt("limit", Integer)],
        Read,
        Auto,
        Binding::Backend("dialogs.search"),
    ),
    method(
        "search_messages",
        "Search messages, optionally scoped to one chat.",
        &[
            req("query", Str),
            opt("chat_id", Integer),
            opt("limit", Integer),
        ],
        Read,
        Auto,
        Binding::Backend("messages.search"),
    ),
    method(
        "search_contacts",
        "Search contacts by name or phone.",
        &[req("query", Str)],
        Read,
        Auto,
        Binding::Backend("contacts.search"),
    ),
    method(
        "search_global",
        "Search public chats and messages platform-wide.",
        &[req("query", Str), opt("limit", Integer)],
        Read,
        Auto,
        Binding::Backend("search.global"),
    ),
    method(
        "get_blocked_users",
        "List blocked users.",
        &[opt("limit", Integer)],
        Read,
        Auto,
        Binding::Backend("contacts.blocked"),
    ),
    method(
        "download_media",
        "Download media attached to a message.",
        &[
            req("chat_id", Integer),
            req("message_id", Integer),
            opt("path", Str),
        ],
        Read,
        Auto,
        Binding::Backend("media.download"),
    ),
    // --- writes --------------------------------------------------------
    method(
        "send_message",
        "Send a text message to a chat.",
        &[
            req("chat_id", Integer),
            req("text", Str),
            opt("reply_to_message_id", Integer),
            opt("parse_mode", Str),
            opt("silent", Boolean),
            opt("schedule_date", Integer),
        ],
        Write,
        Confirm,
        Binding::Backend("messages.send"),
    ),
    method(
        "reply_to_message",
        "Reply to a specific message.",
        &[
            req("chat_id", Integer),
            req("message_id", Integer),
            req("text", Str),
            opt("parse_mode", Str),
        ],
        Write,
        Confirm,
        Binding::Backend("messages.reply"),
    ),
    method(
        "edit_message",
        "Edit a previously sent message.",
        &[
            req("chat_id", Integer),
            req("message_id", Integer),
            req("text", Str),
            opt("parse_mode", Str),
        ],
        Write,
        Confirm,
        Binding::Backend("messages.edit"),
    ),
    method(
        "forward_message",
        "Forward messages between chats.",
        &[
            req("from_chat_id", Integer),
            req("to_chat_id", Integer),
            req("message_ids", Array),
            opt("silent", Boolean),
            opt("as_album", Boolean),
        ],
        Write,
        Confirm,
        Binding::Backend("messages.forward"),
    ),
    method(
        "send_file",
        "Send a file or media to a chat.",
        &[
            req("chat_id", Integer),
            req("path", Str),
            opt("caption", Str),
            opt("silent", Boolean),
        ],
        Write,
        Confirm,
        Binding::Backend("media.send_file"),
    ),
    method(
        "mark_as_read",
        "Mark a chat's messages as read.",
        &[req("chat_id", Integer)],
        Write,
        Confirm,
        Binding::Backend("messages.mark_read"),
    ),
    method(
        "pin_message",
        "Pin a message in a chat.",
        &[
            req("chat_id", Integer),
            req("message_id", Integer),
            opt("notify", Boolean),
        ],
        Write,
        Confirm,
        Binding::Backend("messages.pin"),
    ),
    method(
        "unpin_message",
        "Unpin one message, or all when no id is given.",
        &[req("chat_id", Integer), opt("message_id", Integer)],
        Write,
        Confirm,
        Binding::Backend("messages.unpin"),
    ),
    method(
        "add_contact",
        "Add a contact by phone number.",
        &[
            req("phone", Str),
            req("first_name", Str),
            opt("last_name", Str),
        ],
        Write,
        Confirm,
        Binding::Backend("contacts.add"),
    ),
    method(
        "join_chat_by_invite",
        "Join a chat via invite link.",
        &[req("invite_link", Str)],
        Write,
        Confirm,
        Binding::Backend("chats.join_invite"),
    ),
    method(
        "get_chat_invite_link",
        "Export an invite link for a chat, optionally revoking earlier ones.",
        &[req("chat_id", Integer), opt("revoke_previous", Boolean)],
        Write,
        Confirm,
        Binding::Backend("chats.export_invite"),
    ),
    method(
        "add_chat_member",
        "Add a user to a group.",
        &[
            req("chat_id", Integer),
            req("user_id", Integer),
            opt("forward_limit", Integer),
        ],
        Write,
        Confirm,
        Binding::Backend("chats.add_member"),
    ),
    method(
        "unban_chat_member",
        "Lift a ban on a chat member.",
        &[req("chat_id", Integer), req("user_id", Integer)],
        Write,
        Confirm,
        Binding::Backend("chats.unban_member"),
    ),
    method(
        "block_user",
        "Block a user.",
        &[req("user_id", Integer)],
        Write,
        Confirm,
        Binding::Backend("contacts.block"),
    ),
    method(
        "unblock_user",
        "Unblock a user.",
        &[req("user_id", Integer)],
        Write,
        Confirm,
        Binding::Backend("contacts.unblock"),
    ),
    // --- destructive ---------------------------------------------------
    method(
        "delete_message",
        "Delete messages, optionally for all participants.",
        &[
            req("chat_id", Integer),
            req("message_ids", Array),
            opt("revoke", Boolean),
        ],
        Destructive,
        Confirm,
        Binding::Backend("messages.delete"),
    ),
    method(
        "delete_contact",
        "Remove a user from contacts.",
        &[req("user_id", Integer)],
        Destructive,
        Confirm,
        Binding::Backend("contacts.delete"),
    ),
    method(
        "leave_chat",
        "Leave a group or channel.",
        &[req("chat_id", Integer)],
        Destructive,
        Confirm,
        Binding::Backend("chats.leave"),
    ),
    method(
        "ban_chat_member",
        "Ban a member from a chat.",
        &[req("chat_id", Integer), req("user_id", Integer)],
        Destructive,
        Confirm,
        Binding::Backend("chats.ban_member"),
    ),
    method(
        "kick_chat_member",
        "Remove a member from a chat without banning.",
        &[req("chat_id", Integer), req("user_id", Integer)],
        Destructive,
        Confirm,
        Binding::Backend("chats.kick_member"),
    ),
    method(
        "promote_to_admin",
        "Grant a member administrator rights.",
        &[
            req("chat_id", Integer),
            req("user_id", Integer),
            opt("title", Str),
        ],
        Destructive,
        Confirm,
        Binding::Backend("chats.promote"),
    ),
    // --- auth ----------------------------------------------------------
    method(
        "begin_sign_in",
        "Request a verification code for a phone number.",
        &[req("phone", Str)],
        Write,
        Auto,
        Binding::Auth(AuthOp::BeginSignIn),
    ),
    method(
        "submit_code",
        "Submit the verification code.",
        &[req("code", Str)],
        Write,
        Auto,
        Binding::Auth(AuthOp::SubmitCode),
    ),
    method(
        "submit_second_factor",
        "Submit the two-factor password.",
        &[req("password", Str)],
        Write,
        Auto,
        Binding::Auth(AuthOp::SubmitSecondFactor),
    ),
    method(
        "sign_out",
        "Sign out and invalidate the session.",
        &[],
        Write,
        Auto,
        Binding::Auth(AuthOp::SignOut),
    ),
    method(
        "session_status",
        "Report the current session state.",
        &[],
        Read,
        Auto,
        Binding::Auth(AuthOp::SessionStatus),
    ),
];

/// Pure lookup over the fixed operation set.
#[derive(Debug, Clone)]
pub struct MethodRegistry {
    by_name: HashMap<&'static str, &'static MethodDescriptor>,
}

impl MethodRegistry {
    /// Build the registry from the built-in table.
    #[must_use]
    pub fn builtin() -> Self {
        let by_name = METHODS.iter().map(|m| (m.name, m)).collect();
        Self { by_name }
    }

    /// Look up a descriptor by operation name.
    #[must_use]
    pub fn describe(&self, name: &str) -> Option<&'static MethodDescriptor> {
        self.by_name.get(name).copied()
    }

    /// Iterate all descriptors in table order.
    pub fn iter(&self) -> impl Iterator<Item = &'static MethodDescriptor> {
        METHODS.iter()
    }

    /// Number of registered operations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    /// Whether the table is empty (never, for the built-in set).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}

impl Default for MethodRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}
