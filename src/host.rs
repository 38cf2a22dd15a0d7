// src/host.rs
// License: PolyForm Noncommercial 1.0.0 (Personal & Research Use Only)
// Commercial use is strictly prohibited without a separate agreement.
// Redistribution is permitted provided this notice and license remain intact.

//! Host-OS detection, resolved once via the `target` crate rather than
//! scattering `cfg!` checks through the Tool Registry and CLI.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostOs {
    Windows,
    Linux,
    Macos,
}

impl HostOs {
    pub fn detect() -> Self {
        match target::os() {
            "windows" => HostOs::Windows,
            "macos" => HostOs::Macos,
            _ => HostOs::Linux,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detect_matches_current_target_os() {
        let detected = HostOs::detect();
        #[cfg(target_os = "windows")]
        assert_eq!(detected, HostOs::Windows);
        #[cfg(target_os = "macos")]
        assert_eq!(detected, HostOs::Macos);
        #[cfg(not(any(target_os = "windows", target_os = "macos")))]
        assert_eq!(detected, HostOs::Linux);
    }
}
