//! Parser for the line-oriented output of the power measurement tool.
//!
//! The tool prints one block per measured domain. A line naming the domain
//! (`PKG` for the CPU package, `DRAM` for memory) is followed, a few lines
//! later, by a `Power consumed: <watts> Watt` line:
//!
//! ```text
//! Domain PKG:
//! Energy consumed: 28.1427 Joules
//! Power consumed: 28.1258 Watt
//! Domain DRAM:
//! Energy consumed: 4.01242 Joules
//! Power consumed: 4.00999 Watt
//! ```
//!
//! On multi-socket hosts every socket gets its own block; the values for a
//! domain are summed.

use std::sync::OnceLock;

use regex::Regex;

use crate::metric_names::{MARKER_CPU_PACKAGE, MARKER_DRAM, PHRASE_POWER_CONSUMED};
use crate::types::Reading;

/// Power figures extracted from one tool run.
///
/// A domain is `None` when the output contained no usable power line for
/// it; callers keep the previous value in that case.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PowerReading {
    pub cpu_watts: Option<Reading>,
    pub memory_watts: Option<Reading>,
    /// Power lines that followed a domain marker but carried no number.
    pub skipped_lines: usize,
}

impl PowerReading {
    /// `true` when neither domain produced a value.
    pub fn is_empty(&self) -> bool {
        self.cpu_watts.is_none() && self.memory_watts.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Domain {
    CpuPackage,
    Dram,
}

fn number_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"-?\d[\d,]*(?:\.\d+)?").expect("static regex is valid"))
}

/// First decimal number on `line`, with thousands separators stripped.
pub fn first_number(line: &str) -> Option<Reading> {
    let token = number_pattern().find(line)?.as_str().replace(',', "");
    token.parse::<Reading>().ok().filter(|v| v.is_finite())
}

/// Parse the tool's full stdout.
pub fn parse(output: &str) -> PowerReading {
    let mut reading = PowerReading::default();
    let mut pending: Option<Domain> = None;

    for line in output.lines() {
        if line.contains(MARKER_CPU_PACKAGE) {
            pending = Some(Domain::CpuPackage);
        } else if line.contains(MARKER_DRAM) {
            pending = Some(Domain::Dram);
        } else if line.contains(PHRASE_POWER_CONSUMED) {
            let Some(domain) = pending.take() else {
                continue;
            };
            let Some(watts) = first_number(line) else {
                reading.skipped_lines += 1;
                continue;
            };
            let slot = match domain {
                Domain::CpuPackage => &mut reading.cpu_watts,
                Domain::Dram => &mut reading.memory_watts,
            };
            *slot = Some(slot.unwrap_or(0.0) + watts);
        }
    }

    reading
}

#[cfg(test)]
mod tests {
    use super::*;

    const SINGLE_SOCKET: &str = "\
--------------------------------------------------------------------------------
CPU name:\tIntel(R) Xeon(R) CPU E5-2630 v4 @ 2.20GHz
CPU type:\tIntel Xeon Broadwell EN/EP/EX processor
CPU clock:\t2.20 GHz
--------------------------------------------------------------------------------
Runtime: 1.00018 s
Measure for socket 0 on CPU 0
Domain PKG:
Energy consumed: 28.1427 Joules
Power consumed: 28.1376 Watt
Domain PP0:
Energy consumed: 0 Joules
Power consumed: 0 Watt
Domain DRAM:
Energy consumed: 4.01242 Joules
Power consumed: 4.01169 Watt
--------------------------------------------------------------------------------
";

    #[test]
    fn parses_single_socket_output() {
        let reading = parse(SINGLE_SOCKET);
        assert_eq!(reading.cpu_watts, Some(28.1376));
        assert_eq!(reading.memory_watts, Some(4.01169));
        assert_eq!(reading.skipped_lines, 0);
    }

    #[test]
    fn sums_domains_across_sockets() {
        let output = "\
Measure for socket 0 on CPU 0
Domain PKG:
Power consumed: 20.5 Watt
Domain DRAM:
Power consumed: 3.25 Watt
Measure for socket 1 on CPU 10
Domain PKG:
Power consumed: 19.5 Watt
Domain DRAM:
Power consumed: 2.75 Watt
";
        let reading = parse(output);
        assert_eq!(reading.cpu_watts, Some(40.0));
        assert_eq!(reading.memory_watts, Some(6.0));
    }

    #[test]
    fn power_line_without_marker_is_ignored() {
        let reading = parse("Power consumed: 99 Watt\nDomain PP0:\nPower consumed: 5 Watt\n");
        assert!(reading.is_empty());
    }

    #[test]
    fn malformed_power_line_skips_domain() {
        let output = "Domain PKG:\nPower consumed: n/a Watt\nDomain DRAM:\nPower consumed: 3.5 Watt\n";
        let reading = parse(output);
        assert_eq!(reading.cpu_watts, None);
        assert_eq!(reading.memory_watts, Some(3.5));
        assert_eq!(reading.skipped_lines, 1);
    }

    #[test]
    fn latest_marker_wins() {
        let output = "Domain PKG:\nDomain DRAM:\nPower consumed: 7.5 Watt\n";
        let reading = parse(output);
        assert_eq!(reading.cpu_watts, None);
        assert_eq!(reading.memory_watts, Some(7.5));
    }

    #[test]
    fn empty_output_yields_no_readings() {
        assert!(parse("").is_empty());
        assert!(parse("likwid-powermeter: permission denied\n").is_empty());
    }

    #[test]
    fn first_number_handles_separators_and_signs() {
        assert_eq!(first_number("Power consumed: 1,234.5 Watt"), Some(1234.5));
        assert_eq!(first_number("Power consumed: -0.5 Watt"), Some(-0.5));
        assert_eq!(first_number("Power consumed: 42 Watt"), Some(42.0));
        assert_eq!(first_number("Power consumed: Watt"), None);
    }
}
