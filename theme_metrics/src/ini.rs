//! metrics.ini reader.
//!
//! ```text
//! [ScreenTitle]
//! Fallback=Common
//! LogoX=SCREEN_CENTER_X
//! LogoOnCommand=zoom,0.5;linear,0.25;zoom,1
//! ```

use anyhow::{anyhow, Result};

use crate::Metrics;

pub fn parse(text: &str) -> Result<Metrics> {
    let normalized = text.replace("\r\n", "\n");
    let mut metrics = Metrics::new();
    let mut group: Option<String> = None;

    for (index, raw_line) in normalized.lines().enumerate() {
        let line_no = index + 1;
        let line = raw_line.trim();
        if line.is_empty() || is_comment(line) {
            continue;
        }

        if let Some(rest) = line.strip_prefix('[') {
            let name = rest
                .strip_suffix(']')
                .ok_or_else(|| anyhow!("line {line_no}: unterminated group header"))?
                .trim();
            if name.is_empty() {
                return Err(anyhow!("line {line_no}: empty group name"));
            }
            group = Some(name.to_string());
            continue;
        }

        let Some(current) = group.as_deref() else {
            return Err(anyhow!("line {line_no}: metric outside of any group"));
        };
        let (key, value) = line
            .split_once('=')
            .ok_or_else(|| anyhow!("line {line_no}: expected Key=Value"))?;
        let key = key.trim();
        if key.is_empty() {
            return Err(anyhow!("line {line_no}: empty metric name"));
        }
        metrics.set(current, key, value.trim());
    }

    Ok(metrics)
}

fn is_comment(line: &str) -> bool {
    line.starts_with('#') || line.starts_with(';') || line.starts_with("//")
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "# theme metrics\r\n[Common]\r\nScreenWidth=640\r\n\r\n; comment\r\n[ScreenTitle]\r\nFallback=Common\r\nLogoOnCommand=x,10;y,20\r\n// another\r\nTitle = Dance = Fun \r\n";

    #[test]
    fn parses_groups_and_fallbacks() {
        let metrics = parse(SAMPLE).expect("parse");
        assert_eq!(metrics.get("ScreenTitle", "ScreenWidth"), Some("640"));
        assert_eq!(metrics.get("ScreenTitle", "LogoOnCommand"), Some("x,10;y,20"));
        assert_eq!(metrics.get("ScreenTitle", "Title"), Some("Dance = Fun"));
        assert_eq!(
            metrics
                .group("ScreenTitle")
                .and_then(|group| group.fallback.as_deref()),
            Some("Common")
        );
    }

    #[test]
    fn rejects_orphan_metrics() {
        let err = parse("Key=Value\n").expect_err("orphan metric");
        assert!(err.to_string().contains("line 1"));
    }

    #[test]
    fn rejects_lines_without_separator() {
        let err = parse("[Group]\nnot a metric\n").expect_err("missing '='");
        assert!(err.to_string().contains("line 2"));
    }
}
