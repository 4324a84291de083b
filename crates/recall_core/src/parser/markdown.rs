//! Line-oriented markdown scanner behind [`parse`].

use super::CandidateCard;
use crate::model::card::CardShape;
use once_cell::sync::Lazy;
use regex::Regex;

static HEADING_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^ {0,3}(#{1,6})(?:[ \t]+(.*?))?(?:[ \t]+#+)?[ \t]*$").expect("valid heading regex")
});
static FENCE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^ {0,3}(`{3,}|~{3,})").expect("valid fence regex"));
static SEPARATOR_CELL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^:?-+:?$").expect("valid separator regex"));

const SKIPPED_HEADING_MARKER: &str = "flashcard";

/// Extracts candidate cards from markdown `text`.
///
/// Headings at exactly `header_level` open a card whose back runs until the
/// next heading at that level or shallower. Two-column tables outside an
/// open section yield one card per data row.
pub fn parse(text: &str, header_level: u8) -> Vec<CandidateCard> {
    let lines: Vec<&str> = text.lines().collect();
    let mut index = front_matter_end(&lines);
    let mut cards = Vec::new();
    let mut open: Option<Section<'_>> = None;
    let mut fence: Option<Fence> = None;

    while index < lines.len() {
        let line = lines[index];

        if let Some(current) = fence {
            if current.is_closed_by(line) {
                fence = None;
            }
            if let Some(section) = open.as_mut() {
                section.body.push(line);
            }
            index += 1;
            continue;
        }

        if let Some(opened) = Fence::opened_by(line) {
            fence = Some(opened);
            if let Some(section) = open.as_mut() {
                section.body.push(line);
            }
            index += 1;
            continue;
        }

        if let Some((level, title)) = heading(line) {
            if level <= header_level {
                if let Some(section) = open.take() {
                    section.emit(&mut cards);
                }
                if level == header_level && opens_card(title) {
                    open = Some(Section {
                        front: title.to_string(),
                        line: index + 1,
                        body: Vec::new(),
                    });
                }
            } else if let Some(section) = open.as_mut() {
                section.body.push(line);
            }
            index += 1;
            continue;
        }

        if let Some(section) = open.as_mut() {
            section.body.push(line);
            index += 1;
            continue;
        }

        if is_table_header(&lines, index) {
            index = consume_table(&lines, index, &mut cards);
            continue;
        }

        index += 1;
    }

    if let Some(section) = open.take() {
        section.emit(&mut cards);
    }
    cards
}

struct Section<'a> {
    front: String,
    line: usize,
    body: Vec<&'a str>,
}

impl Section<'_> {
    fn emit(self, cards: &mut Vec<CandidateCard>) {
        let back = collapse_back(&self.body);
        if back.is_empty() {
            return;
        }
        cards.push(CandidateCard {
            front: self.front,
            back,
            shape: CardShape::HeaderParagraph,
            line: self.line,
        });
    }
}

#[derive(Debug, Clone, Copy)]
struct Fence {
    marker: char,
    len: usize,
}

impl Fence {
    fn opened_by(line: &str) -> Option<Self> {
        let captures = FENCE_RE.captures(line)?;
        let run = captures.get(1)?.as_str();
        let marker = run.chars().next()?;
        Some(Self {
            marker,
            len: run.len(),
        })
    }

    fn is_closed_by(self, line: &str) -> bool {
        let trimmed = line.trim();
        let run = trimmed.chars().take_while(|ch| *ch == self.marker).count();
        run >= self.len && trimmed[run..].trim().is_empty()
    }
}

/// Index of the first line after a leading `---` front-matter block.
pub(crate) fn front_matter_end(lines: &[&str]) -> usize {
    if lines.first().map(|line| line.trim_end()) != Some("---") {
        return 0;
    }
    lines
        .iter()
        .enumerate()
        .skip(1)
        .find(|(_, line)| matches!(line.trim_end(), "---" | "..."))
        .map(|(index, _)| index + 1)
        .unwrap_or(0)
}

fn heading(line: &str) -> Option<(u8, &str)> {
    let captures = HEADING_RE.captures(line)?;
    let level = captures.get(1)?.as_str().len() as u8;
    let title = captures.get(2).map(|title| title.as_str().trim()).unwrap_or("");
    Some((level, title))
}

fn opens_card(title: &str) -> bool {
    !title.is_empty() && !title.to_lowercase().contains(SKIPPED_HEADING_MARKER)
}

/// Trims the section and collapses runs of blank lines to one.
fn collapse_back(body: &[&str]) -> String {
    let mut lines: Vec<&str> = Vec::with_capacity(body.len());
    for line in body {
        let line = line.trim_end();
        if line.is_empty() && lines.last().is_some_and(|last| last.is_empty()) {
            continue;
        }
        lines.push(line);
    }
    lines.join("\n").trim().to_string()
}

fn is_table_header(lines: &[&str], index: usize) -> bool {
    let Some(header) = table_cells(lines[index]) else {
        return false;
    };
    let Some(separator) = lines.get(index + 1).and_then(|line| table_cells(line)) else {
        return false;
    };
    separator.len() == header.len()
        && separator
            .iter()
            .all(|cell| SEPARATOR_CELL_RE.is_match(cell))
}

/// Emits rows of the table starting at `start`; returns the first index
/// after the table.
fn consume_table(lines: &[&str], start: usize, cards: &mut Vec<CandidateCard>) -> usize {
    let two_columns = table_cells(lines[start]).is_some_and(|cells| cells.len() == 2);
    let mut index = start + 2;
    while index < lines.len() {
        if Fence::opened_by(lines[index]).is_some() || heading(lines[index]).is_some() {
            break;
        }
        let Some(cells) = table_cells(lines[index]) else {
            break;
        };
        if two_columns && cells.len() == 2 && !cells[0].is_empty() && !cells[1].is_empty() {
            let mut cells = cells.into_iter();
            if let (Some(front), Some(back)) = (cells.next(), cells.next()) {
                cards.push(CandidateCard {
                    front,
                    back,
                    shape: CardShape::Table,
                    line: index + 1,
                });
            }
        }
        index += 1;
    }
    index
}

/// Splits a pipe-table row into trimmed cells, honoring `\|` escapes.
/// Returns `None` for lines without an unescaped pipe.
fn table_cells(line: &str) -> Option<Vec<String>> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }

    let mut cells = Vec::new();
    let mut current = String::new();
    let mut saw_pipe = false;
    let mut chars = trimmed.chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            '\\' if chars.peek() == Some(&'|') => {
                current.push('|');
                chars.next();
            }
            '|' => {
                saw_pipe = true;
                cells.push(std::mem::take(&mut current));
            }
            other => current.push(other),
        }
    }
    if !saw_pipe {
        return None;
    }
    cells.push(current);

    if trimmed.starts_with('|') {
        cells.remove(0);
    }
    if trimmed.ends_with('|') && !trimmed.ends_with("\\|") {
        cells.pop();
    }
    Some(cells.into_iter().map(|cell| cell.trim().to_string()).collect())
}
