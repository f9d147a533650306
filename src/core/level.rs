//! Log level definitions and the per-dispatcher level registry

use super::error::{LoggerError, Result};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::OnceLock;

// Custom level names, leaked once per distinct spelling
static NAMES: OnceLock<Mutex<HashSet<&'static str>>> = OnceLock::new();

fn intern(name: &str) -> &'static str {
    let mut names = NAMES.get_or_init(Default::default).lock();
    if let Some(existing) = names.get(name) {
        return existing;
    }
    let leaked: &'static str = Box::leak(name.to_string().into_boxed_str());
    names.insert(leaked);
    leaked
}

/// A named severity with a numeric rank.
///
/// Comparison (`==`, `<`, ...) looks at the rank only, so two custom levels
/// registered with the same rank are interchangeable for filtering. The
/// registration sequence number (`order`) only matters for display sorting,
/// see [`Level::display_cmp`].
#[derive(Debug, Clone, Copy)]
pub struct Level {
    name: &'static str,
    rank: u32,
    order: u64,
}

impl Level {
    pub const TRACE: Level = Level::builtin("TRACE", 5, 0);
    pub const DEBUG: Level = Level::builtin("DEBUG", 10, 1);
    pub const INFO: Level = Level::builtin("INFO", 20, 2);
    pub const SUCCESS: Level = Level::builtin("SUCCESS", 25, 3);
    pub const WARNING: Level = Level::builtin("WARNING", 30, 4);
    pub const ERROR: Level = Level::builtin("ERROR", 40, 5);
    pub const CRITICAL: Level = Level::builtin("CRITICAL", 50, 6);

    pub const LOWEST: Level = Level::TRACE;
    pub const HIGHEST: Level = Level::CRITICAL;

    pub const BUILTIN: [Level; 7] = [
        Level::TRACE,
        Level::DEBUG,
        Level::INFO,
        Level::SUCCESS,
        Level::WARNING,
        Level::ERROR,
        Level::CRITICAL,
    ];

    const fn builtin(name: &'static str, rank: u32, order: u64) -> Self {
        Self { name, rank, order }
    }

    #[inline]
    pub fn name(&self) -> &'static str {
        self.name
    }

    #[inline]
    pub fn rank(&self) -> u32 {
        self.rank
    }

    /// Registration sequence number
    #[inline]
    pub fn order(&self) -> u64 {
        self.order
    }

    pub fn is_builtin(&self) -> bool {
        self.order < Level::BUILTIN.len() as u64
    }

    /// Rank-based comparison used for filtering
    pub fn compare(a: &Level, b: &Level) -> Ordering {
        a.rank.cmp(&b.rank)
    }

    /// Total order for display: rank first, then registration order
    pub fn display_cmp(&self, other: &Level) -> Ordering {
        self.rank
            .cmp(&other.rank)
            .then(self.order.cmp(&other.order))
    }

    #[cfg(feature = "console")]
    pub fn color_code(&self) -> Option<colored::Color> {
        use colored::Color::*;
        if !self.is_builtin() {
            return None;
        }
        Some(match self.rank {
            r if r <= Level::TRACE.rank => BrightBlack,
            r if r <= Level::DEBUG.rank => Blue,
            r if r <= Level::INFO.rank => White,
            r if r <= Level::SUCCESS.rank => Green,
            r if r <= Level::WARNING.rank => Yellow,
            r if r <= Level::ERROR.rank => Red,
            _ => BrightRed,
        })
    }

    fn builtin_by_name(name: &str) -> Option<Level> {
        match name.to_ascii_uppercase().as_str() {
            "TRACE" => Some(Level::TRACE),
            "DEBUG" => Some(Level::DEBUG),
            "INFO" => Some(Level::INFO),
            "SUCCESS" => Some(Level::SUCCESS),
            "WARNING" | "WARN" => Some(Level::WARNING),
            "ERROR" => Some(Level::ERROR),
            "CRITICAL" | "FATAL" => Some(Level::CRITICAL),
            _ => None,
        }
    }
}

impl PartialEq for Level {
    fn eq(&self, other: &Self) -> bool {
        self.rank == other.rank
    }
}

impl Eq for Level {}

impl PartialOrd for Level {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Level {
    fn cmp(&self, other: &Self) -> Ordering {
        Level::compare(self, other)
    }
}

impl Default for Level {
    fn default() -> Self {
        Level::INFO
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.name)
    }
}

impl FromStr for Level {
    type Err = LoggerError;

    /// Parses built-in level names only; custom levels are resolved through
    /// a [`LevelRegistry`].
    fn from_str(s: &str) -> Result<Self> {
        Level::builtin_by_name(s).ok_or_else(|| LoggerError::UnknownLevel(s.to_string()))
    }
}

impl Serialize for Level {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name)
    }
}

impl<'de> Deserialize<'de> for Level {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        name.parse().map_err(serde::de::Error::custom)
    }
}

/// Name to level mapping, pre-populated with the built-in levels.
///
/// Names are matched case-insensitively. Custom level names are interned for
/// the life of the process so that [`Level`] stays `Copy`.
#[derive(Debug)]
pub struct LevelRegistry {
    levels: RwLock<HashMap<String, Level>>,
    next_order: AtomicU64,
}

impl LevelRegistry {
    pub fn new() -> Self {
        let levels = Level::BUILTIN
            .iter()
            .map(|level| (level.name.to_string(), *level))
            .collect();
        Self {
            levels: RwLock::new(levels),
            next_order: AtomicU64::new(Level::BUILTIN.len() as u64),
        }
    }

    /// Register a custom level.
    ///
    /// Registering an existing name again with the same rank returns the
    /// existing level; a different rank fails with
    /// [`LoggerError::DuplicateLevelName`].
    pub fn register(&self, name: &str, rank: u32) -> Result<Level> {
        let trimmed = name.trim();
        if trimmed.is_empty() || trimmed.chars().any(char::is_whitespace) {
            return Err(LoggerError::config(
                "LevelRegistry",
                format!("invalid level name '{}'", name),
            ));
        }

        let key = canonical_key(trimmed);
        let mut levels = self.levels.write();
        if let Some(existing) = levels.get(&key) {
            if existing.rank == rank {
                return Ok(*existing);
            }
            return Err(LoggerError::DuplicateLevelName {
                name: trimmed.to_string(),
                existing_rank: existing.rank,
                requested_rank: rank,
            });
        }

        let level = Level {
            name: intern(trimmed),
            rank,
            order: self.next_order.fetch_add(1, AtomicOrdering::Relaxed),
        };
        levels.insert(key, level);
        Ok(level)
    }

    /// Remove a custom level. Built-in levels cannot be removed.
    pub fn remove(&self, name: &str) -> Result<Level> {
        let key = canonical_key(name);
        let mut levels = self.levels.write();
        let builtin = match levels.get(&key) {
            Some(level) => level.is_builtin(),
            None => return Err(LoggerError::UnknownLevel(name.to_string())),
        };
        if builtin {
            return Err(LoggerError::config(
                "LevelRegistry",
                format!("built-in level '{}' cannot be removed", key),
            ));
        }
        levels
            .remove(&key)
            .ok_or_else(|| LoggerError::UnknownLevel(name.to_string()))
    }

    pub fn get(&self, name: &str) -> Option<Level> {
        self.levels.read().get(&canonical_key(name)).copied()
    }

    /// Look up a level by name, failing with [`LoggerError::UnknownLevel`]
    pub fn resolve(&self, name: &str) -> Result<Level> {
        self.get(name)
            .ok_or_else(|| LoggerError::UnknownLevel(name.to_string()))
    }

    /// All registered levels, sorted for display
    pub fn levels(&self) -> Vec<Level> {
        let mut levels: Vec<Level> = self.levels.read().values().copied().collect();
        levels.sort_by(Level::display_cmp);
        levels
    }
}

impl Default for LevelRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn canonical_key(name: &str) -> String {
    let key = name.trim().to_ascii_uppercase();
    match key.as_str() {
        "WARN" => "WARNING".to_string(),
        "FATAL" => "CRITICAL".to_string(),
        _ => key,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_ordering() {
        assert!(Level::TRACE < Level::DEBUG);
        assert!(Level::DEBUG < Level::INFO);
        assert!(Level::INFO < Level::SUCCESS);
        assert!(Level::SUCCESS < Level::WARNING);
        assert!(Level::WARNING < Level::ERROR);
        assert!(Level::ERROR < Level::CRITICAL);
        assert_eq!(Level::LOWEST, Level::TRACE);
        assert_eq!(Level::HIGHEST, Level::CRITICAL);
    }

    #[test]
    fn test_from_str_aliases() {
        assert_eq!("warn".parse::<Level>().unwrap(), Level::WARNING);
        assert_eq!("Fatal".parse::<Level>().unwrap(), Level::CRITICAL);
        assert!(matches!(
            "NOTICE".parse::<Level>(),
            Err(LoggerError::UnknownLevel(_))
        ));
    }

    #[test]
    fn test_register_custom_level() {
        let registry = LevelRegistry::new();
        let notice = registry.register("NOTICE", 27).unwrap();

        assert_eq!(notice.name(), "NOTICE");
        assert!(notice > Level::INFO);
        assert!(notice < Level::WARNING);
        assert!(!notice.is_builtin());
        assert_eq!(registry.resolve("notice").unwrap().rank(), 27);
    }

    #[test]
    fn test_register_duplicate_name() {
        let registry = LevelRegistry::new();
        let first = registry.register("AUDIT", 35).unwrap();
        let again = registry.register("audit", 35).unwrap();
        assert_eq!(first.order(), again.order());

        let err = registry.register("AUDIT", 36).unwrap_err();
        assert!(matches!(err, LoggerError::DuplicateLevelName { .. }));

        let err = registry.register("INFO", 21).unwrap_err();
        assert!(matches!(err, LoggerError::DuplicateLevelName { .. }));
    }

    #[test]
    fn test_register_alias_of_builtin() {
        let registry = LevelRegistry::new();
        let err = registry.register("WARN", 99).unwrap_err();
        assert!(matches!(
            err,
            LoggerError::DuplicateLevelName { existing_rank: 30, requested_rank: 99, .. }
        ));
        assert_eq!(registry.register("fatal", 50).unwrap().name(), "CRITICAL");

        assert!(registry.levels().iter().all(|l| l.rank() != 99));
        assert_eq!(registry.resolve("WARN").unwrap().rank(), 30);
    }

    #[test]
    fn test_custom_names_interned_once() {
        let a = LevelRegistry::new().register("INTERNED", 33).unwrap();
        let b = LevelRegistry::new().register("INTERNED", 34).unwrap();
        assert!(std::ptr::eq(a.name(), b.name()));
        assert_ne!(a.rank(), b.rank());
    }

    #[test]
    fn test_equal_rank_levels() {
        let registry = LevelRegistry::new();
        let a = registry.register("ALPHA", 25).unwrap();
        let b = registry.register("BETA", 25).unwrap();

        assert_eq!(a, b);
        assert_eq!(a, Level::SUCCESS);
        assert_eq!(a.display_cmp(&b), Ordering::Less);

        let names: Vec<&str> = registry
            .levels()
            .iter()
            .filter(|l| l.rank() == 25)
            .map(|l| l.name())
            .collect();
        assert_eq!(names, vec!["SUCCESS", "ALPHA", "BETA"]);
    }

    #[test]
    fn test_remove_level() {
        let registry = LevelRegistry::new();
        registry.register("VERBOSE", 7).unwrap();
        assert!(registry.remove("verbose").is_ok());
        assert!(registry.get("VERBOSE").is_none());
        assert!(matches!(
            registry.remove("VERBOSE"),
            Err(LoggerError::UnknownLevel(_))
        ));
        assert!(registry.remove("INFO").unwrap_err().is_configuration());
    }

    #[test]
    fn test_invalid_names() {
        let registry = LevelRegistry::new();
        assert!(registry.register("", 1).is_err());
        assert!(registry.register("TWO WORDS", 1).is_err());
    }

    #[test]
    fn test_display_padding() {
        assert_eq!(format!("{:<7}|", Level::INFO), "INFO   |");
        assert_eq!(Level::WARNING.to_string(), "WARNING");
    }

    #[test]
    fn test_serde_roundtrip_builtin() {
        let json = serde_json::to_string(&Level::ERROR).unwrap();
        assert_eq!(json, "\"ERROR\"");
        let level: Level = serde_json::from_str("\"warn\"").unwrap();
        assert_eq!(level, Level::WARNING);
    }
}
