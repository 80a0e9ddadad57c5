//! Free-text entity resolution: by id, by mention syntax, or by
//! case-insensitive name match (substring or whole-word).

use once_cell::sync::Lazy;
use regex::Regex;

use crate::entity::{Channel, Emoji, Guild, Role, User};

static USER_MENTION: Lazy<Regex> = Lazy::new(|| Regex::new(r"<@!?(\d{17,19})>").unwrap());
static CHANNEL_MENTION: Lazy<Regex> = Lazy::new(|| Regex::new(r"<#(\d{17,19})>").unwrap());
static ROLE_MENTION: Lazy<Regex> = Lazy::new(|| Regex::new(r"<@&(\d{17,19})>").unwrap());
static EMOJI_MENTION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<a?:[a-zA-Z0-9_]+:(\d{17,19})>").unwrap());

/// Extract the id out of a user mention, if `text` is one.
pub fn user_mention_id(text: &str) -> Option<String> {
    USER_MENTION.captures(text).map(|c| c[1].to_string())
}

pub fn channel_mention_id(text: &str) -> Option<String> {
    CHANNEL_MENTION.captures(text).map(|c| c[1].to_string())
}

pub fn role_mention_id(text: &str) -> Option<String> {
    ROLE_MENTION.captures(text).map(|c| c[1].to_string())
}

pub fn emoji_mention_id(text: &str) -> Option<String> {
    EMOJI_MENTION.captures(text).map(|c| c[1].to_string())
}

fn fold(text: &str, case_sensitive: bool) -> String {
    if case_sensitive {
        text.to_string()
    } else {
        text.to_lowercase()
    }
}

pub fn check_user(text: &str, user: &User, case_sensitive: bool, whole_word: bool) -> bool {
    if user.id == text {
        return true;
    }
    if user_mention_id(text).as_deref() == Some(user.id.as_str()) {
        return true;
    }

    let text = fold(text, case_sensitive);
    let name = fold(&user.name, case_sensitive);
    let discrim = user.discriminator.as_deref().unwrap_or("");

    // "name#discriminator" splits into both halves.
    let (text_name, text_discrim) = match text.split_once('#') {
        Some((n, d)) => (n, Some(d)),
        None => (text.as_str(), None),
    };

    if !whole_word {
        return name.contains(text.as_str())
            || (text_discrim.is_some_and(|d| discrim.contains(d)) && name.contains(text_name));
    }

    name == text || (text_discrim == Some(discrim) && name == text_name)
}

pub fn resolve_user(
    text: &str,
    users: &[User],
    case_sensitive: bool,
    whole_word: bool,
) -> Option<User> {
    users
        .iter()
        .find(|u| u.id == text)
        .or_else(|| {
            users
                .iter()
                .find(|u| check_user(text, u, case_sensitive, whole_word))
        })
        .cloned()
}

pub fn resolve_users(
    text: &str,
    users: &[User],
    case_sensitive: bool,
    whole_word: bool,
) -> Vec<User> {
    users
        .iter()
        .filter(|u| check_user(text, u, case_sensitive, whole_word))
        .cloned()
        .collect()
}

pub fn check_channel(text: &str, channel: &Channel, case_sensitive: bool, whole_word: bool) -> bool {
    if channel.id == text {
        return true;
    }
    if channel_mention_id(text).as_deref() == Some(channel.id.as_str()) {
        return true;
    }

    let text = fold(text, case_sensitive);
    let name = fold(&channel.name, case_sensitive);
    let bare = text.strip_prefix('#').unwrap_or(&text);

    if !whole_word {
        return name.contains(text.as_str()) || name.contains(bare);
    }

    name == text || name == bare
}

pub fn resolve_channel(
    text: &str,
    channels: &[Channel],
    case_sensitive: bool,
    whole_word: bool,
) -> Option<Channel> {
    channels
        .iter()
        .find(|c| c.id == text)
        .or_else(|| {
            channels
                .iter()
                .find(|c| check_channel(text, c, case_sensitive, whole_word))
        })
        .cloned()
}

pub fn resolve_channels(
    text: &str,
    channels: &[Channel],
    case_sensitive: bool,
    whole_word: bool,
) -> Vec<Channel> {
    channels
        .iter()
        .filter(|c| check_channel(text, c, case_sensitive, whole_word))
        .cloned()
        .collect()
}

pub fn check_role(text: &str, role: &Role, case_sensitive: bool, whole_word: bool) -> bool {
    if role.id == text {
        return true;
    }
    if role_mention_id(text).as_deref() == Some(role.id.as_str()) {
        return true;
    }

    let text = fold(text, case_sensitive);
    let name = fold(&role.name, case_sensitive);
    let bare = text.strip_prefix('@').unwrap_or(&text);

    if !whole_word {
        return name.contains(text.as_str()) || name.contains(bare);
    }

    name == text || name == bare
}

pub fn resolve_role(
    text: &str,
    roles: &[Role],
    case_sensitive: bool,
    whole_word: bool,
) -> Option<Role> {
    roles
        .iter()
        .find(|r| r.id == text)
        .or_else(|| {
            roles
                .iter()
                .find(|r| check_role(text, r, case_sensitive, whole_word))
        })
        .cloned()
}

pub fn resolve_roles(
    text: &str,
    roles: &[Role],
    case_sensitive: bool,
    whole_word: bool,
) -> Vec<Role> {
    roles
        .iter()
        .filter(|r| check_role(text, r, case_sensitive, whole_word))
        .cloned()
        .collect()
}

pub fn check_emoji(text: &str, emoji: &Emoji, case_sensitive: bool, whole_word: bool) -> bool {
    if emoji.id == text {
        return true;
    }
    if emoji_mention_id(text).as_deref() == Some(emoji.id.as_str()) {
        return true;
    }

    let text = fold(text, case_sensitive);
    let name = fold(&emoji.name, case_sensitive);
    let bare = text.trim_matches(':');

    if !whole_word {
        return name.contains(text.as_str()) || name.contains(bare);
    }

    name == text || name == bare
}

pub fn resolve_emoji(
    text: &str,
    emojis: &[Emoji],
    case_sensitive: bool,
    whole_word: bool,
) -> Option<Emoji> {
    emojis
        .iter()
        .find(|e| e.id == text)
        .or_else(|| {
            emojis
                .iter()
                .find(|e| check_emoji(text, e, case_sensitive, whole_word))
        })
        .cloned()
}

pub fn resolve_emojis(
    text: &str,
    emojis: &[Emoji],
    case_sensitive: bool,
    whole_word: bool,
) -> Vec<Emoji> {
    emojis
        .iter()
        .filter(|e| check_emoji(text, e, case_sensitive, whole_word))
        .cloned()
        .collect()
}

pub fn check_guild(text: &str, guild: &Guild, case_sensitive: bool, whole_word: bool) -> bool {
    if guild.id == text {
        return true;
    }

    let text = fold(text, case_sensitive);
    let name = fold(&guild.name, case_sensitive);

    if !whole_word {
        return name.contains(text.as_str());
    }

    name == text
}

pub fn resolve_guild(
    text: &str,
    guilds: &[Guild],
    case_sensitive: bool,
    whole_word: bool,
) -> Option<Guild> {
    guilds
        .iter()
        .find(|g| g.id == text)
        .or_else(|| {
            guilds
                .iter()
                .find(|g| check_guild(text, g, case_sensitive, whole_word))
        })
        .cloned()
}

pub fn resolve_guilds(
    text: &str,
    guilds: &[Guild],
    case_sensitive: bool,
    whole_word: bool,
) -> Vec<Guild> {
    guilds
        .iter()
        .filter(|g| check_guild(text, g, case_sensitive, whole_word))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::ChannelKind;

    fn user(id: &str, name: &str, discrim: Option<&str>) -> User {
        User {
            id: id.into(),
            name: name.into(),
            discriminator: discrim.map(String::from),
            bot: false,
        }
    }

    #[test]
    fn resolves_user_by_id_mention_and_name() {
        let users = vec![
            user("11111111111111111", "alice", Some("0001")),
            user("22222222222222222", "alicia", Some("0002")),
        ];

        assert_eq!(
            resolve_user("11111111111111111", &users, false, false).unwrap().name,
            "alice"
        );
        assert_eq!(
            resolve_user("<@!22222222222222222>", &users, false, false)
                .unwrap()
                .name,
            "alicia"
        );
        // Substring match hits the first candidate.
        assert_eq!(
            resolve_user("ali", &users, false, false).unwrap().name,
            "alice"
        );
        // Whole-word only matches exactly.
        assert_eq!(
            resolve_user("alicia", &users, false, true).unwrap().name,
            "alicia"
        );
        assert!(resolve_user("ali", &users, false, true).is_none());
    }

    #[test]
    fn resolves_user_by_name_and_discriminator() {
        let users = vec![
            user("11111111111111111", "dup", Some("0001")),
            user("22222222222222222", "dup", Some("0002")),
        ];
        assert_eq!(
            resolve_user("dup#0002", &users, false, true).unwrap().id,
            "22222222222222222"
        );
    }

    #[test]
    fn channel_match_strips_hash_prefix() {
        let channels = vec![Channel {
            id: "33333333333333333".into(),
            name: "general".into(),
            kind: ChannelKind::Text,
            guild_id: Some("g".into()),
            recipient: None,
        }];
        assert!(resolve_channel("#general", &channels, false, true).is_some());
        assert!(resolve_channel("<#33333333333333333>", &channels, false, false).is_some());
    }

    #[test]
    fn plural_resolution_filters_all_matches() {
        let users = vec![
            user("1", "red", None),
            user("2", "redder", None),
            user("3", "blue", None),
        ];
        let matched = resolve_users("red", &users, false, false);
        assert_eq!(matched.len(), 2);
    }
}
