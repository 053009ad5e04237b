//! Retention policies and backup-name grouping
//!
//! Dump artifacts are named `<name>_<YYYY-MM-DD_HH-MM-SS>.<ext>`, e.g.
//! `shop_2024-03-01_02-00-00.sql.gz`. Grouping by derived name keeps the
//! last N dumps of each database independently.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which files a rotation keeps
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetentionPolicy {
    /// Keep the `n` newest files of each group
    KeepLast(usize),
    /// Keep files modified at or after `cutoff`; one ungrouped pass
    KeepNewerThan(DateTime<Utc>),
}

impl RetentionPolicy {
    /// Policy keeping files modified within the last `days` days
    ///
    /// A window reaching past the earliest representable instant keeps
    /// everything.
    #[must_use]
    pub fn keep_days(days: u32, now: DateTime<Utc>) -> Self {
        let cutoff = now
            .checked_sub_signed(chrono::Duration::days(i64::from(days)))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        Self::KeepNewerThan(cutoff)
    }
}

/// How candidates are partitioned before a count policy applies
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Grouping {
    /// All candidates form one group
    None,
    /// One group per name derived with [`derive_backup_name`]
    #[default]
    ByName,
}

/// Length of the `_YYYY-MM-DD_HH-MM-SS` suffix written by the dump producer
const TIMESTAMP_SUFFIX_LEN: usize = 20;

/// Derive the logical backup name of a dump file
///
/// The extension (everything from the first `.`) is removed first. If the
/// remaining stem ends with `_YYYY-MM-DD_HH-MM-SS`, the name is what comes
/// before it. Otherwise the name is everything before the last `_`, or the
/// whole stem when it has no `_`.
///
/// ```
/// use s3backup_core::domain::derive_backup_name;
///
/// assert_eq!(derive_backup_name("shop_2024-03-01_02-00-00.sql.gz"), "shop");
/// assert_eq!(derive_backup_name("my_shop_2024-03-01_02-00-00.sql.gz"), "my_shop");
/// assert_eq!(derive_backup_name("shop_v2.sql.gz"), "shop");
/// ```
#[must_use]
pub fn derive_backup_name(file_name: &str) -> &str {
    let stem = match file_name.find('.') {
        Some(0) | None => file_name,
        Some(idx) => &file_name[..idx],
    };

    if stem.len() > TIMESTAMP_SUFFIX_LEN {
        let split = stem.len() - TIMESTAMP_SUFFIX_LEN;
        if stem.is_char_boundary(split) && is_timestamp_suffix(&stem[split..]) {
            return &stem[..split];
        }
    }

    match stem.rfind('_') {
        Some(idx) if idx > 0 => &stem[..idx],
        _ => stem,
    }
}

/// Matches `_DDDD-DD-DD_DD-DD-DD`
fn is_timestamp_suffix(suffix: &str) -> bool {
    const SHAPE: &[u8] = b"_dddd-dd-dd_dd-dd-dd";

    suffix.len() == SHAPE.len()
        && suffix.bytes().zip(SHAPE).all(|(byte, &shape)| match shape {
            b'd' => byte.is_ascii_digit(),
            other => byte == other,
        })
}
