//! Parser for the metadata tags a chat server prepends to an inbound line.
//!
//! A tag string looks like `@badges=subscriber/6;color=#FF0000;mod=1`.
//! Parsing is lenient: anything the parser does not understand is logged and
//! the affected field keeps its default, so a message is never lost because
//! of its metadata.

use std::collections::HashSet;
use std::fmt::Display;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::EnumString;
use thiserror::Error;
use tracing::{error, warn};

/// Every tag string has to start with this marker.
pub const TAG_MARKER: char = '@';

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TagError {
    /// The leading `@` is missing, the string is not a tag list at all.
    #[error("tags must start with '@', got `{0}`")]
    MissingMarker(String),
}

/// Position of an emote inside the message text. `start` and `end` are
/// character offsets, both inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Emote {
    pub id: u64,
    pub start: u32,
    pub end: u32,
}

impl Emote {
    pub fn new(id: u64, start: u32, end: u32) -> Self {
        Self { id, start, end }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize, EnumString)]
#[strum(ascii_case_insensitive)]
pub enum UserType {
    #[default]
    #[strum(serialize = "")]
    Normal,
    #[strum(serialize = "mod")]
    Moderator,
    #[strum(serialize = "global_mod")]
    GlobalMod,
    #[strum(serialize = "admin")]
    Admin,
    #[strum(serialize = "staff")]
    Staff,
}

/// Structured view of the metadata attached to one inbound line.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Tags {
    pub color: String,
    pub display_name: String,
    pub emote_only: bool,
    pub emotes: HashSet<Emote>,
    pub message_id: String,
    pub is_moderator: bool,
    pub room_id: u64,
    pub is_subscriber: bool,
    /// Milliseconds since the unix epoch, as stamped by the chat server.
    pub server_timestamp: i64,
    pub is_turbo: bool,
    pub user_id: u64,
    pub user_type: UserType,
    pub bits: u64,
    /// Badge names in the order the server sent them, versions stripped.
    pub badges: Vec<String>,
}

impl Tags {
    /// Parse a tag string, falling back to default values when it is not a
    /// tag string at all. Never fails.
    pub fn parse(raw: &str) -> Self {
        match Self::try_parse(raw) {
            Ok(tags) => tags,
            Err(e) => {
                error!(error = %e, "does not seem to be a valid tag string");
                Tags::default()
            }
        }
    }

    /// Parse a tag string. Only a missing marker is an error, problems with
    /// single tags are logged and defaulted.
    pub fn try_parse(raw: &str) -> Result<Self, TagError> {
        let body = raw
            .strip_prefix(TAG_MARKER)
            .ok_or_else(|| TagError::MissingMarker(raw.to_string()))?;

        let mut tags = Tags::default();
        for pair in body.split(';') {
            let (name, value) = pair.split_once('=').unwrap_or((pair, ""));
            if !tags.assign(name, value) {
                error!(tag = name, value, "unknown tag");
            }
        }
        Ok(tags)
    }

    /// Store one tag. `false` if the name is not one we know.
    fn assign(&mut self, name: &str, value: &str) -> bool {
        match name.to_ascii_lowercase().as_str() {
            "color" => self.color = value.to_string(),
            "bits" => self.bits = parse_number(name, value),
            "badges" => self.badges = parse_badges(value),
            "display-name" => self.display_name = value.to_string(),
            "emote-only" => self.emote_only = parse_bool(value),
            "emotes" => self.emotes.extend(parse_emotes(value)),
            "id" => self.message_id = value.to_string(),
            "mod" => self.is_moderator = parse_bool(value),
            "room-id" => self.room_id = parse_number(name, value),
            "subscriber" => self.is_subscriber = parse_bool(value),
            "tmi-sent-ts" => self.server_timestamp = parse_number(name, value),
            "turbo" => self.is_turbo = parse_bool(value),
            "user-id" => self.user_id = parse_number(name, value),
            "user-type" => self.user_type = parse_user_type(value),
            _ => return false,
        }
        true
    }

    /// Server receive time, if the timestamp tag was present and sane.
    pub fn server_time(&self) -> Option<DateTime<Utc>> {
        if self.server_timestamp == 0 {
            return None;
        }
        DateTime::from_timestamp_millis(self.server_timestamp)
    }

    pub fn has_badge(&self, badge: &str) -> bool {
        self.badges.iter().any(|b| b.eq_ignore_ascii_case(badge))
    }

    /// Moderators, staff and the broadcaster.
    pub fn is_privileged(&self) -> bool {
        self.is_moderator || self.user_type != UserType::Normal || self.has_badge("broadcaster")
    }
}

fn parse_bool(value: &str) -> bool {
    value != "0"
}

fn parse_number<T>(field: &str, value: &str) -> T
where
    T: FromStr + Default,
    T::Err: Display,
{
    match value.trim().parse::<T>() {
        Ok(n) => n,
        Err(e) => {
            warn!(tag = field, value, error = %e, "could not parse number, using 0");
            T::default()
        }
    }
}

fn parse_user_type(value: &str) -> UserType {
    UserType::from_str(value).unwrap_or_else(|_| {
        error!(value, "unknown user type");
        UserType::Normal
    })
}

// badges=subscriber/6,premium/1
fn parse_badges(value: &str) -> Vec<String> {
    value
        .split(',')
        .filter_map(|badge| {
            let name = badge.split('/').next().unwrap_or_default();
            (!name.is_empty()).then(|| name.to_string())
        })
        .collect()
}

// emotes=emoteId:start-end[,start-end][/emoteId:start-end...]
fn parse_emotes(value: &str) -> HashSet<Emote> {
    let mut emotes = HashSet::new();
    if value.is_empty() {
        return emotes;
    }

    for definition in value.split('/') {
        let Some((id, positions)) = definition.split_once(':') else {
            warn!(definition, "emote without position list");
            continue;
        };
        let id = parse_number("emotes", id);

        for position in positions.split(',') {
            let (start, end) = position.split_once('-').unwrap_or((position, ""));
            emotes.insert(Emote {
                id,
                start: parse_number("emotes", start),
                end: parse_number("emotes", end),
            });
        }
    }
    emotes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn color_and_mod() {
        let tags = Tags::parse("@color=blue;mod=1");
        assert_eq!(tags.color, "blue");
        assert!(tags.is_moderator);
    }

    #[test]
    fn missing_marker_yields_defaults() {
        let tags = Tags::parse("color=blue;mod=1");
        assert_eq!(tags, Tags::default());
        assert_eq!(
            Tags::try_parse("color=blue"),
            Err(TagError::MissingMarker("color=blue".into()))
        );
    }

    #[test]
    fn emotes_are_split_by_id_and_position() {
        let tags = Tags::parse("@emotes=25:0-4,6-10/1902:14-18");
        let expected: HashSet<Emote> = [
            Emote::new(25, 0, 4),
            Emote::new(25, 6, 10),
            Emote::new(1902, 14, 18),
        ]
        .into_iter()
        .collect();
        assert_eq!(tags.emotes, expected);
    }

    #[test]
    fn empty_or_broken_emotes() {
        assert!(Tags::parse("@emotes=").emotes.is_empty());

        let tags = Tags::parse("@emotes=abc:x-3/nocolon");
        assert_eq!(tags.emotes.len(), 1);
        assert!(tags.emotes.contains(&Emote::new(0, 0, 3)));
    }

    #[test]
    fn badges_keep_order_and_drop_versions() {
        let tags = Tags::parse("@badges=subscriber/6,premium/1");
        assert_eq!(tags.badges, vec!["subscriber", "premium"]);

        let tags = Tags::parse("@badges=");
        assert!(tags.badges.is_empty());
    }

    #[test]
    fn bits_do_not_touch_badges() {
        let tags = Tags::parse("@badges=bits/100;bits=100");
        assert_eq!(tags.bits, 100);
        assert_eq!(tags.badges, vec!["bits"]);
    }

    #[test]
    fn unknown_tags_are_skipped() {
        let tags = Tags::parse("@flags=;color=#00FF7F;client-nonce=abc;turbo=0");
        assert_eq!(tags.color, "#00FF7F");
        assert!(!tags.is_turbo);
    }

    #[test]
    fn unknown_names_are_reported() {
        let mut tags = Tags::default();
        assert!(!tags.assign("flags", ""));
        assert!(!tags.assign("client-nonce", "abc"));
        assert_eq!(tags, Tags::default());

        assert!(tags.assign("Color", "red"));
        assert!(tags.assign("room-id", "oops"));
        assert_eq!(tags.color, "red");
    }

    #[test]
    fn bad_numbers_default_to_zero() {
        let tags = Tags::parse("@room-id=abc;user-id=42;tmi-sent-ts=");
        assert_eq!(tags.room_id, 0);
        assert_eq!(tags.user_id, 42);
        assert_eq!(tags.server_timestamp, 0);
        assert_eq!(tags.server_time(), None);
    }

    #[test]
    fn booleans_are_only_false_for_zero() {
        let tags = Tags::parse("@subscriber=1;emote-only=0;turbo=yes");
        assert!(tags.is_subscriber);
        assert!(!tags.emote_only);
        assert!(tags.is_turbo);
    }

    #[test]
    fn user_types() {
        assert_eq!(Tags::parse("@user-type=").user_type, UserType::Normal);
        assert_eq!(Tags::parse("@user-type=mod").user_type, UserType::Moderator);
        assert_eq!(Tags::parse("@user-type=GLOBAL_MOD").user_type, UserType::GlobalMod);
        assert_eq!(Tags::parse("@user-type=admin").user_type, UserType::Admin);
        assert_eq!(Tags::parse("@user-type=staff").user_type, UserType::Staff);
        assert_eq!(Tags::parse("@user-type=wizard").user_type, UserType::Normal);
    }

    #[test]
    fn keys_are_case_insensitive() {
        let tags = Tags::parse("@Display-Name=Ronni;COLOR=red");
        assert_eq!(tags.display_name, "Ronni");
        assert_eq!(tags.color, "red");
    }

    #[test]
    fn full_privmsg_tags() {
        let raw = "@badge-info=;badges=broadcaster/1,premium/1;color=#0D4200;display-name=ronni;\
                   emotes=25:0-4;id=b34ccfc7-4977-403a-8a94-33c6bac34fb8;mod=0;room-id=1337;\
                   subscriber=0;tmi-sent-ts=1507246572675;turbo=1;user-id=1337;user-type=global_mod";
        let tags = Tags::parse(raw);

        assert_eq!(tags.display_name, "ronni");
        assert_eq!(tags.message_id, "b34ccfc7-4977-403a-8a94-33c6bac34fb8");
        assert_eq!(tags.room_id, 1337);
        assert_eq!(tags.user_id, 1337);
        assert_eq!(tags.user_type, UserType::GlobalMod);
        assert!(tags.is_turbo);
        assert!(tags.has_badge("broadcaster"));
        assert!(tags.is_privileged());
        assert_eq!(
            tags.server_time().map(|t| t.timestamp_millis()),
            Some(1507246572675)
        );
    }
}
