use crate::error::{Error, Result};
use crate::timecode::{self, ARROW};

/// One numbered subtitle cue.
#[derive(Debug, Clone, PartialEq)]
pub struct SubtitleEntry {
    /// 1-based position in the document.
    pub index: usize,
    pub start: f64,
    pub end: f64,
    pub text: String,
}

/// An ordered list of subtitle entries.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubtitleDocument {
    pub entries: Vec<SubtitleEntry>,
}

impl SubtitleDocument {
    /// Build a document from `(start, end, text)` triples, numbering from 1.
    pub fn from_cues<I, S>(cues: I) -> Self
    where
        I: IntoIterator<Item = (f64, f64, S)>,
        S: Into<String>,
    {
        let entries = cues
            .into_iter()
            .enumerate()
            .map(|(i, (start, end, text))| SubtitleEntry {
                index: i + 1,
                start,
                end,
                text: text.into(),
            })
            .collect();
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Format as SRT.
    pub fn to_srt(&self) -> String {
        let mut out = String::new();
        for entry in &self.entries {
            out.push_str(&format!("{}\n", entry.index));
            out.push_str(&format!(
                "{} {ARROW} {}\n",
                timecode::seconds_to_timestamp(entry.start),
                timecode::seconds_to_timestamp(entry.end)
            ));
            out.push_str(&entry.text);
            out.push_str("\n\n");
        }
        out
    }

    /// Format as WebVTT.
    pub fn to_vtt(&self) -> String {
        let mut out = String::from("WEBVTT\n\n");
        for entry in &self.entries {
            out.push_str(&format!(
                "{} {ARROW} {}\n",
                timecode::seconds_to_vtt_timestamp(entry.start),
                timecode::seconds_to_vtt_timestamp(entry.end)
            ));
            out.push_str(&entry.text);
            out.push_str("\n\n");
        }
        out
    }
}

fn blocks(content: &str) -> Vec<Vec<&str>> {
    let content = content.trim_start_matches('\u{feff}');
    let mut blocks = Vec::new();
    let mut current = Vec::new();
    for line in content.lines() {
        let line = line.trim_end_matches('\r');
        if line.trim().is_empty() {
            if !current.is_empty() {
                blocks.push(std::mem::take(&mut current));
            }
        } else {
            current.push(line);
        }
    }
    if !current.is_empty() {
        blocks.push(current);
    }
    blocks
}

/// Parse SRT content, failing on the first malformed block.
///
/// Every block must be `index`, `start --> end`, then at least one text line.
pub fn parse_srt(content: &str) -> Result<SubtitleDocument> {
    let mut entries = Vec::new();
    for (n, block) in blocks(content).into_iter().enumerate() {
        let block_no = n + 1;
        if block.len() < 3 {
            return Err(Error::Parse(format!(
                "block {block_no}: expected index, timing and text lines, found {} line(s)",
                block.len()
            )));
        }
        let index = block[0].trim().parse::<usize>().map_err(|_| {
            Error::Parse(format!("block {block_no}: bad index {:?}", block[0].trim()))
        })?;
        let (start, end) = timecode::parse_timing_line(block[1])
            .map_err(|_| Error::Parse(format!("block {block_no}: bad timing line {:?}", block[1])))?;
        entries.push(SubtitleEntry {
            index,
            start,
            end,
            text: block[2..].join("\n"),
        });
    }
    Ok(SubtitleDocument { entries })
}

/// Parse SRT content, keeping whatever entries can be recovered.
///
/// Blocks without a readable timing line are dropped. Index lines are ignored
/// and entries are numbered by position; text may be empty.
pub fn parse_srt_lenient(content: &str) -> SubtitleDocument {
    let mut cues = Vec::new();
    for block in blocks(content) {
        let Some(pos) = block.iter().position(|l| timecode::is_timing_line(l)) else {
            continue;
        };
        let Ok((start, end)) = timecode::parse_timing_line(block[pos]) else {
            continue;
        };
        cues.push((start, end, block[pos + 1..].join("\n")));
    }
    SubtitleDocument::from_cues(cues)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> SubtitleDocument {
        SubtitleDocument::from_cues([(0.0, 3.0, "Hello"), (3.0, 6.5, "World\nagain")])
    }

    #[test]
    fn test_to_srt() {
        let srt = sample().to_srt();
        assert_eq!(
            srt,
            "1\n00:00:00,000 --> 00:00:03,000\nHello\n\n\
             2\n00:00:03,000 --> 00:00:06,500\nWorld\nagain\n\n"
        );
    }

    #[test]
    fn test_to_vtt() {
        let vtt = sample().to_vtt();
        assert!(vtt.starts_with("WEBVTT\n\n"));
        assert!(vtt.contains("00:00:03.000 --> 00:00:06.500\nWorld\nagain\n\n"));
        assert!(!vtt.contains("\n1\n"));
    }

    #[test]
    fn test_parse_srt_reads_back_rendered_output() {
        let doc = sample();
        let parsed = parse_srt(&doc.to_srt()).unwrap();
        assert_eq!(parsed, doc);
    }

    #[test]
    fn test_parse_srt_tolerates_crlf_and_bom() {
        let content = "\u{feff}1\r\n00:00:01,000 --> 00:00:02,000\r\nHi\r\n\r\n";
        let doc = parse_srt(content).unwrap();
        assert_eq!(doc.len(), 1);
        assert_eq!(doc.entries[0].text, "Hi");
    }

    #[test]
    fn test_parse_srt_rejects_malformed() {
        assert!(matches!(
            parse_srt("1\n00:00:01,000 --> 00:00:02,000\n\n"),
            Err(Error::Parse(_))
        ));
        assert!(matches!(
            parse_srt("x\n00:00:01,000 --> 00:00:02,000\nHi\n"),
            Err(Error::Parse(_))
        ));
        assert!(matches!(
            parse_srt("1\n00:00:01 --> 00:00:02\nHi\n"),
            Err(Error::Parse(_))
        ));
    }

    #[test]
    fn test_parse_srt_empty_content() {
        assert!(parse_srt("").unwrap().is_empty());
        assert!(parse_srt("\n\n  \n").unwrap().is_empty());
    }

    #[test]
    fn test_parse_lenient_recovers_entries() {
        let content = "7\n00:00:01.000 --> 00:00:02.000\nOne\n\n\
                       garbage block\n\n\
                       00:00:03,000 --> 00:00:04,000\nTwo\n\n\
                       9\n00:00:05,000 --> 00:00:06,000\n";
        let doc = parse_srt_lenient(content);
        let got: Vec<_> = doc
            .entries
            .iter()
            .map(|e| (e.index, e.start, e.text.as_str()))
            .collect();
        assert_eq!(got, vec![(1, 1.0, "One"), (2, 3.0, "Two"), (3, 5.0, "")]);
    }
}
