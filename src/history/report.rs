//! Plain-text history report: resolved submissions grouped by date, newest
//! date first, then by submitter.

use std::collections::BTreeMap;

use chrono::NaiveDate;

use crate::model::{HistoryEntry, actor_label};

/// Chat messages are capped around 4096 characters; stay under that.
pub const MAX_CHUNK_CHARS: usize = 4000;

const HEADER: &str = "History of resolved submissions:\n\n";

/// Render entries into one or more message-sized chunks.
///
/// Chunks split between date blocks where possible. A day too large for one
/// chunk is split between submitters, or between numbers of a single
/// submitter, and each continuation chunk repeats the date heading.
pub fn render(entries: &[HistoryEntry]) -> Vec<String> {
    if entries.is_empty() {
        return vec!["History is empty.".to_string()];
    }

    let mut by_date: BTreeMap<NaiveDate, Vec<&HistoryEntry>> = BTreeMap::new();
    for entry in entries {
        by_date.entry(entry.date).or_default().push(entry);
    }

    let mut out = Chunks::new();
    for (date, day) in by_date.iter().rev() {
        let heading = format!("{}:\n", date.format("%d.%m.%Y"));
        let groups = submitter_groups(day);

        let mut block = heading.clone();
        for (label, payloads) in &groups {
            block.push_str(&submitter_group(label, payloads));
        }
        block.push('\n');

        if !out.fits(&block) && !out.is_blank() {
            out.split(None);
        }
        if out.fits(&block) {
            out.push(&block);
            continue;
        }

        out.push(&heading);
        for (label, payloads) in &groups {
            let group = submitter_group(label, payloads);
            if !out.fits(&group) && chars(&heading) + chars(&group) <= MAX_CHUNK_CHARS {
                out.split(Some(&heading));
            }
            if out.fits(&group) {
                out.push(&group);
                continue;
            }

            let label_line = format!("   {label}:\n");
            let mut labelled = false;
            for payload in payloads {
                let line = format!("      +{payload}\n");
                let needed = if labelled {
                    chars(&line)
                } else {
                    chars(&label_line) + chars(&line)
                };
                if !out.fits_len(needed) {
                    out.split(Some(&heading));
                    labelled = false;
                }
                if !labelled {
                    out.push(&label_line);
                    labelled = true;
                }
                out.push(&line);
            }
            out.push_if_fits("\n");
        }
        out.push_if_fits("\n");
    }
    out.finish()
}

/// Submitters in first-seen order, each with their numbers.
fn submitter_groups<'a>(entries: &[&'a HistoryEntry]) -> Vec<(String, Vec<&'a str>)> {
    let mut submitters: Vec<(String, Vec<&str>)> = Vec::new();
    for entry in entries {
        let label = actor_label(entry.submitter, entry.submitter_handle.as_deref());
        match submitters.iter_mut().find(|(l, _)| *l == label) {
            Some((_, payloads)) => payloads.push(&entry.payload),
            None => submitters.push((label, vec![&entry.payload])),
        }
    }
    submitters
}

fn submitter_group(label: &str, payloads: &[&str]) -> String {
    let mut group = format!("   {label}:\n");
    for payload in payloads {
        group.push_str(&format!("      +{payload}\n"));
    }
    group.push('\n');
    group
}

fn chars(text: &str) -> usize {
    text.chars().count()
}

/// Accumulates text into chunks of at most [`MAX_CHUNK_CHARS`].
struct Chunks {
    done: Vec<String>,
    current: String,
    len: usize,
    /// Nothing but the report header or a fresh chunk so far.
    blank: bool,
}

impl Chunks {
    fn new() -> Self {
        Self {
            done: Vec::new(),
            current: HEADER.to_string(),
            len: chars(HEADER),
            blank: true,
        }
    }

    fn fits(&self, text: &str) -> bool {
        self.fits_len(chars(text))
    }

    fn fits_len(&self, len: usize) -> bool {
        self.len + len <= MAX_CHUNK_CHARS
    }

    fn is_blank(&self) -> bool {
        self.blank
    }

    fn push(&mut self, text: &str) {
        self.current.push_str(text);
        self.len += chars(text);
        self.blank = false;
    }

    fn push_if_fits(&mut self, text: &str) {
        if self.fits(text) {
            self.push(text);
        }
    }

    /// Close the current chunk and start the next with `heading`, if any.
    fn split(&mut self, heading: Option<&str>) {
        let next = heading.unwrap_or_default().to_string();
        self.len = chars(&next);
        self.blank = heading.is_none();
        self.done.push(std::mem::replace(&mut self.current, next));
    }

    fn finish(mut self) -> Vec<String> {
        self.done.push(self.current);
        self.done
    }
}
