//! Stable per-host identifier used to bind the credential vault to a machine.

use std::path::Path;
use std::process::Command;

/// Prefix for the identifier used when no platform lookup succeeds.
const FALLBACK_PREFIX: &str = "fallback-machine-id-";

/// The host identifier, or a home-directory based fallback.
///
/// The fallback keeps the vault usable on hosts without a readable machine
/// id, at the cost of binding it to the home path instead of the host.
pub fn machine_id(home: &Path) -> String {
    platform_id().unwrap_or_else(|| format!("{FALLBACK_PREFIX}{}", home.display()))
}

#[cfg(target_os = "linux")]
fn platform_id() -> Option<String> {
    ["/etc/machine-id", "/var/lib/dbus/machine-id"]
        .iter()
        .filter_map(|path| std::fs::read_to_string(path).ok())
        .map(|content| content.trim().to_owned())
        .find(|id| !id.is_empty())
}

#[cfg(target_os = "macos")]
fn platform_id() -> Option<String> {
    let output = command_output("ioreg", &["-rd1", "-c", "IOPlatformExpertDevice"])?;
    platform_uuid(&output)
}

#[cfg(target_os = "windows")]
fn platform_id() -> Option<String> {
    let output = command_output("cmd", &["/C", "wmic csproduct get UUID"])?;
    output
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty() && *line != "UUID")
        .map(ToOwned::to_owned)
}

#[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
fn platform_id() -> Option<String> {
    None
}

#[cfg_attr(not(any(target_os = "macos", target_os = "windows")), allow(dead_code))]
fn command_output(program: &str, args: &[&str]) -> Option<String> {
    let output = Command::new(program).args(args).output().ok()?;
    if !output.status.success() {
        return None;
    }
    String::from_utf8(output.stdout).ok()
}

/// Extract `IOPlatformUUID` from `ioreg` output.
#[cfg_attr(not(target_os = "macos"), allow(dead_code))]
fn platform_uuid(ioreg: &str) -> Option<String> {
    ioreg
        .lines()
        .filter(|line| line.contains("IOPlatformUUID"))
        .find_map(|line| line.split_once('='))
        .map(|(_, value)| value.trim().trim_matches('"').to_owned())
        .filter(|id| !id.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ioreg_uuid_is_extracted() {
        let output = r#"+-o MacBookPro18,3  <class IOPlatformExpertDevice>
    {
      "IOPlatformSerialNumber" = "C02XXXXXXX"
      "IOPlatformUUID" = "8A3C1D2E-0000-1111-2222-333344445555"
    }"#;
        assert_eq!(
            platform_uuid(output).as_deref(),
            Some("8A3C1D2E-0000-1111-2222-333344445555")
        );
        assert!(platform_uuid("nothing here").is_none());
    }

    #[test]
    fn identifier_is_stable_and_non_empty() {
        let home = Path::new("/home/someone");
        let first = machine_id(home);
        assert!(!first.is_empty());
        assert_eq!(first, machine_id(home));
    }
}
