//! Extraction of scored poses from docking engine reports
//!
//! The text layout of engine reports is an external contract that changes
//! between engine releases, so it is kept behind [`ResultParser`]: the rest of
//! the pipeline only sees [`PoseResult`] records.

use log::warn;
use regex::Regex;
use std::sync::OnceLock;

use crate::table::PoseResult;

/// Poses recovered from one report
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedReport {
    /// Poses numbered 1..=n in report order
    pub poses: Vec<PoseResult>,

    /// Result lines that matched the marker but carried unusable numbers
    pub skipped: usize,
}

impl ParsedReport {
    pub fn is_empty(&self) -> bool {
        self.poses.is_empty()
    }

    /// Append the next pose, or count it as skipped when its bounds are inconsistent
    fn push(&mut self, affinity: f64, rmsd_lb: f64, rmsd_ub: f64) {
        let pose = PoseResult {
            pose: self.poses.len() + 1,
            affinity,
            rmsd_lb,
            rmsd_ub,
        };
        if pose.is_consistent() {
            self.poses.push(pose);
        } else {
            warn!(
                "Skipping inconsistent result: affinity {}, rmsd l.b. {}, rmsd u.b. {}",
                affinity, rmsd_lb, rmsd_ub
            );
            self.skipped += 1;
        }
    }
}

/// A versioned report format
pub trait ResultParser {
    /// Identifier of the report format this parser understands
    fn format(&self) -> &'static str;

    /// Extract at most `limit` poses from `report`
    ///
    /// Finding nothing is not an error: the result is simply empty.
    fn parse(&self, report: &str, limit: usize) -> ParsedReport;
}

/// Pattern of the per-pose remark written into Vina poses files
pub const VINA_RESULT_PATTERN: &str =
    r"REMARK VINA RESULT:\s*([-+]?[\d.]+)\s+([-+]?[\d.]+)\s+([-+]?[\d.]+)";

fn vina_result_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(VINA_RESULT_PATTERN).expect("valid Vina result pattern"))
}

/// Parser for `REMARK VINA RESULT: <affinity> <rmsd lb> <rmsd ub>` lines
#[derive(Debug, Clone, Copy, Default)]
pub struct VinaRemarkParser;

impl ResultParser for VinaRemarkParser {
    fn format(&self) -> &'static str {
        "vina-remark/1"
    }

    fn parse(&self, report: &str, limit: usize) -> ParsedReport {
        let regex = vina_result_regex();
        let mut parsed = ParsedReport::default();

        for (idx, line) in report.lines().enumerate() {
            if parsed.poses.len() >= limit {
                break;
            }

            let Some(caps) = regex.captures(line) else {
                continue;
            };

            match (
                caps[1].parse::<f64>(),
                caps[2].parse::<f64>(),
                caps[3].parse::<f64>(),
            ) {
                (Ok(affinity), Ok(lb), Ok(ub)) => parsed.push(affinity, lb, ub),
                _ => {
                    warn!("Skipping malformed result on line {}: {}", idx + 1, line.trim());
                    parsed.skipped += 1;
                }
            }
        }

        parsed
    }
}

/// Number structured `(affinity, lb, ub)` tuples the same way text reports are
pub fn normalize<I>(scores: I, limit: usize) -> ParsedReport
where
    I: IntoIterator<Item = (f64, f64, f64)>,
{
    let mut parsed = ParsedReport::default();
    for (affinity, rmsd_lb, rmsd_ub) in scores {
        if parsed.poses.len() >= limit {
            break;
        }
        parsed.push(affinity, rmsd_lb, rmsd_ub);
    }
    parsed
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result_line(affinity: f64, lb: f64, ub: f64) -> String {
        format!(
            "REMARK VINA RESULT:    {:6.3}      {:.3}      {:.3}",
            affinity, lb, ub
        )
    }

    fn report_with(k: usize) -> String {
        let mut text = String::new();
        for i in 0..k {
            text.push_str(&format!("MODEL {}\n", i + 1));
            text.push_str(&result_line(-9.0 + i as f64 * 0.5, i as f64, i as f64 * 2.0));
            text.push('\n');
            text.push_str("REMARK INTER + INTRA:         -11.296\n");
            text.push_str("ATOM      1  C1  UNL     1       1.000   2.000   3.000  0.00  0.00    +0.000 C\n");
            text.push_str("ENDMDL\n");
        }
        text
    }

    #[test]
    fn test_count_is_min_of_lines_and_limit() {
        let parser = VinaRemarkParser;
        for k in [0, 1, 3, 9, 12] {
            for limit in [1, 5, 10] {
                let parsed = parser.parse(&report_with(k), limit);
                let expected = k.min(limit);
                assert_eq!(parsed.poses.len(), expected, "k={} limit={}", k, limit);
                let indices: Vec<usize> = parsed.poses.iter().map(|p| p.pose).collect();
                assert_eq!(indices, (1..=expected).collect::<Vec<_>>());
            }
        }
    }

    #[test]
    fn test_values_in_input_order() {
        let parsed = VinaRemarkParser.parse(&report_with(3), 10);
        let affinities: Vec<f64> = parsed.poses.iter().map(|p| p.affinity).collect();
        assert_eq!(affinities, vec![-9.0, -8.5, -8.0]);
        assert_eq!(parsed.poses[2].rmsd_lb, 2.0);
        assert_eq!(parsed.poses[2].rmsd_ub, 4.0);
        assert_eq!(parsed.skipped, 0);
    }

    #[test]
    fn test_no_marker_lines_is_empty() {
        let parsed = VinaRemarkParser.parse("MODEL 1\nATOM ...\nENDMDL\n", 10);
        assert!(parsed.is_empty());
        assert_eq!(parsed.skipped, 0);
    }

    #[test]
    fn test_malformed_number_is_skipped() {
        let text = "\
REMARK VINA RESULT:    -7.1.2      0.000      0.000
REMARK VINA RESULT:    -6.500      1.000      2.000
REMARK VINA RESULT:    -6.000      3.000      1.000
REMARK VINA RESULT:    -5.500      2.000      4.000
";
        let parsed = VinaRemarkParser.parse(text, 10);
        assert_eq!(parsed.skipped, 2);
        assert_eq!(parsed.poses.len(), 2);
        assert_eq!(parsed.poses[0].pose, 1);
        assert_eq!(parsed.poses[0].affinity, -6.5);
        assert_eq!(parsed.poses[1].pose, 2);
        assert_eq!(parsed.poses[1].affinity, -5.5);
    }

    #[test]
    fn test_signed_values_and_leading_space() {
        let parsed = VinaRemarkParser.parse("  REMARK VINA RESULT: +1.25 0 0.5\n", 10);
        assert_eq!(parsed.poses.len(), 1);
        assert_eq!(parsed.poses[0].affinity, 1.25);
    }

    #[test]
    fn test_normalize_structured() {
        let parsed = normalize(vec![(-8.0, 0.0, 0.0), (-7.0, -1.0, 2.0), (-6.0, 1.0, 2.0)], 2);
        assert_eq!(parsed.poses.len(), 2);
        assert_eq!(parsed.poses[1].pose, 2);
        assert_eq!(parsed.poses[1].affinity, -6.0);
        assert_eq!(parsed.skipped, 1);
    }

    #[test]
    fn test_format_is_versioned() {
        assert_eq!(VinaRemarkParser.format(), "vina-remark/1");
    }
}
