//! Pure classification of archive directory names.
//!
//! Patch directories carry a `ps<patch>-<day>-<month>-<year>` token written by
//! the patch inflater; full-client snapshots carry an `ep<episode>` token. Both
//! parsers work on a single directory name and never touch the filesystem.

use std::sync::OnceLock;

use ini::Ini;
use regex::Regex;
use time::{Date, Month};

/// Section holding the client version in `Version.ini`.
pub const VERSION_SECTION: &str = "Version";
/// Key holding the client's current patch number.
pub const VERSION_KEY: &str = "CurrentVersion";

fn patch_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"ps(\d{4})-(\d{1,2})-(\d{1,2})-(\d{4})").expect("patch token pattern")
    })
}

fn episode_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"ep(\d+(?:\.\d+)?)").expect("episode token pattern"))
}

/// Patch number and release date decoded from a patch directory name.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PatchToken {
    pub patch: u16,
    pub date: Date,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PatchTokenError {
    #[error("patch token '{token}' does not encode a calendar date")]
    InvalidDate { token: String },
}

/// Decodes the `ps####-d-m-yyyy` token embedded anywhere in `name`.
///
/// Returns `Ok(None)` when the name carries no token at all.
pub fn parse_patch_token(name: &str) -> Result<Option<PatchToken>, PatchTokenError> {
    let Some(captures) = patch_pattern().captures(name) else {
        return Ok(None);
    };
    let token = captures[0].to_string();
    let invalid = || PatchTokenError::InvalidDate {
        token: token.clone(),
    };

    // The pattern pins every group to a bounded digit run, so these parses
    // can only fail on overflow of the narrower target types.
    let patch: u16 = captures[1].parse().map_err(|_| invalid())?;
    let day: u8 = captures[2].parse().map_err(|_| invalid())?;
    let month: u8 = captures[3].parse().map_err(|_| invalid())?;
    let year: i32 = captures[4].parse().map_err(|_| invalid())?;

    let month = Month::try_from(month).map_err(|_| invalid())?;
    let date = Date::from_calendar_date(year, month, day).map_err(|_| invalid())?;
    Ok(Some(PatchToken { patch, date }))
}

/// An `ep<episode>` token located inside a directory name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EpisodeToken {
    /// The episode as written, e.g. `4` or `2.1`.
    pub episode: String,
    /// Byte offset just past the token; the client root ends here.
    pub end: usize,
}

impl EpisodeToken {
    /// The episode truncated to its integer part, used as a fallback patch
    /// number when the client has no `Version.ini`.
    #[must_use]
    pub fn patch(&self) -> Option<u16> {
        self.episode.split('.').next()?.parse().ok()
    }
}

pub fn parse_episode_token(name: &str) -> Option<EpisodeToken> {
    let captures = episode_pattern().captures(name)?;
    let whole = captures.get(0)?;
    Some(EpisodeToken {
        episode: captures[1].to_string(),
        end: whole.end(),
    })
}

/// Reads `[Version] CurrentVersion=<int>` from the text of a `Version.ini`.
///
/// Section and key lookup ignore ASCII case, matching how the game client
/// reads the file. A leading UTF-8 byte-order mark is skipped.
pub fn parse_current_version(contents: &str) -> Option<u16> {
    let contents = contents.strip_prefix('\u{feff}').unwrap_or(contents);
    let ini = Ini::load_from_str(contents).ok()?;
    let (_, section) = ini.iter().find(|(name, _)| {
        name.is_some_and(|name| name.trim().eq_ignore_ascii_case(VERSION_SECTION))
    })?;
    section
        .iter()
        .find(|(key, _)| key.trim().eq_ignore_ascii_case(VERSION_KEY))
        .and_then(|(_, value)| value.trim().parse().ok())
}
