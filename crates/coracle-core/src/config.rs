//! Launch configuration
//!
//! A [`LaunchConfig`] is resolved once from flags/environment and never
//! mutated. Because the two launch phases are separate OS processes, the
//! configuration crosses the process boundary as argv: [`LaunchConfig::replay_flags`]
//! emits the exact flag list the child phase re-parses.

use std::path::PathBuf;
use std::time::Duration;

/// Resolved configuration for one container launch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchConfig {
    /// Root filesystem the child phase chroots into
    pub chroot: PathBuf,

    /// Initial working directory, resolved inside the post-chroot tree
    pub chdir: PathBuf,

    /// Deadline for the whole launch; `None` means run forever
    pub timeout: Option<Duration>,

    /// Emit internal diagnostics
    pub loud: bool,
}

impl LaunchConfig {
    /// Validate the resolved configuration.
    ///
    /// # Errors
    ///
    /// Returns [`crate::LaunchError::Config`] when the chroot path is empty,
    /// i.e. neither the flag nor its environment fallback was provided.
    pub fn validate(&self) -> crate::Result<()> {
        if self.chroot.as_os_str().is_empty() {
            return Err(crate::LaunchError::Config(
                "chroot path is required (--chrt flag or GONTAINER_FS environment)".into(),
            ));
        }
        Ok(())
    }

    /// Re-playable flag list covering every flag this configuration carries.
    ///
    /// Valued flags are echoed as `--flag value` pairs, boolean flags as a
    /// bare switch, and the unset timeout is omitted so the unbounded default
    /// round-trips. Re-parsing the result must yield a structurally equal
    /// configuration; the child phase depends on this, since it parses argv
    /// fresh rather than inheriting in-memory state.
    #[must_use]
    pub fn replay_flags(&self) -> Vec<String> {
        let mut flags = vec![
            "--chrt".to_owned(),
            self.chroot.display().to_string(),
            "--chdr".to_owned(),
            self.chdir.display().to_string(),
        ];
        if let Some(timeout) = self.timeout {
            flags.push("--timeout".to_owned());
            flags.push(format_duration(timeout));
        }
        if self.loud {
            flags.push("--loud".to_owned());
        }
        flags
    }
}

/// Parse a duration string: decimal integer plus `ms`/`s`/`m`/`h` suffix,
/// or a bare integer meaning seconds.
///
/// # Errors
///
/// Returns a description of the malformed input, suitable for clap's
/// value-parser error path.
pub fn parse_duration(input: &str) -> Result<Duration, String> {
    let input = input.trim();
    if input.is_empty() {
        return Err("empty duration".to_owned());
    }

    let split = input
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(input.len());
    let (digits, unit) = input.split_at(split);

    let value: u64 = digits
        .parse()
        .map_err(|_| format!("invalid duration {input:?}: expected digits before the unit"))?;

    let to_secs = |scale: u64| {
        value
            .checked_mul(scale)
            .map(Duration::from_secs)
            .ok_or_else(|| format!("duration {input:?} is out of range"))
    };

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        "" | "s" => to_secs(1),
        "m" => to_secs(60),
        "h" => to_secs(3600),
        other => Err(format!(
            "invalid duration {input:?}: unknown unit {other:?} (expected ms, s, m or h)"
        )),
    }
}

/// Format a duration for the replay argv. Millisecond granularity is enough
/// for launch timeouts and keeps the echo lossless against [`parse_duration`].
#[must_use]
pub fn format_duration(duration: Duration) -> String {
    format!("{}ms", duration.as_millis())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(timeout: Option<Duration>, loud: bool) -> LaunchConfig {
        LaunchConfig {
            chroot: PathBuf::from("/mnt/alpine"),
            chdir: PathBuf::from("/usr"),
            timeout,
            loud,
        }
    }

    #[test]
    fn empty_chroot_fails_validation() {
        let cfg = LaunchConfig {
            chroot: PathBuf::new(),
            ..config(None, false)
        };
        assert!(cfg.validate().is_err());
        assert!(config(None, false).validate().is_ok());
    }

    #[test]
    fn replay_covers_valued_flags_as_pairs() {
        let flags = config(Some(Duration::from_secs(30)), false).replay_flags();
        assert_eq!(
            flags,
            vec!["--chrt", "/mnt/alpine", "--chdr", "/usr", "--timeout", "30000ms"]
        );
    }

    #[test]
    fn replay_echoes_boolean_flag_as_bare_switch() {
        let flags = config(None, true).replay_flags();
        assert_eq!(flags.last().map(String::as_str), Some("--loud"));
        assert!(!flags.contains(&"--timeout".to_owned()));
    }

    #[test]
    fn unset_timeout_is_omitted_from_replay() {
        let flags = config(None, false).replay_flags();
        assert!(!flags.iter().any(|f| f == "--timeout"));
    }

    #[test]
    fn durations_parse_with_each_unit() {
        assert_eq!(parse_duration("500ms"), Ok(Duration::from_millis(500)));
        assert_eq!(parse_duration("30s"), Ok(Duration::from_secs(30)));
        assert_eq!(parse_duration("2m"), Ok(Duration::from_secs(120)));
        assert_eq!(parse_duration("1h"), Ok(Duration::from_secs(3600)));
    }

    #[test]
    fn bare_integer_means_seconds() {
        assert_eq!(parse_duration("15"), Ok(Duration::from_secs(15)));
    }

    #[test]
    fn malformed_durations_are_rejected() {
        assert!(parse_duration("").is_err());
        assert!(parse_duration("fast").is_err());
        assert!(parse_duration("10d").is_err());
        assert!(parse_duration("ms").is_err());
    }

    #[test]
    fn oversized_durations_are_rejected_not_panicked_on() {
        // Parseable digits whose unit scaling would overflow u64 seconds.
        assert!(parse_duration("9999999999999999999h").is_err());
        assert!(parse_duration("9999999999999999999m").is_err());
        // The same magnitude is fine where no scaling applies.
        assert!(parse_duration("9999999999999999999s").is_ok());
    }

    #[test]
    fn formatted_duration_round_trips_through_parse() {
        let original = Duration::from_millis(1500);
        assert_eq!(parse_duration(&format_duration(original)), Ok(original));
    }
}
