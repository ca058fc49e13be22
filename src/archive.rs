use crate::board::parse_position;
use anyhow::{Context, Result};
use pgn_reader::{RawTag, Reader, SanPlus, Skip, Visitor};
use shakmaty::{Chess, Color};
use std::fs::File;
use std::mem;
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};
use unicode_normalization::UnicodeNormalization;

pub const UNKNOWN_DATE: &str = "????.??.??";

/// One game from the archive: the headers the scanner needs plus the mainline.
#[derive(Debug, Clone, Default)]
pub struct PgnGame {
    pub index: u64,
    pub white: Option<String>,
    pub black: Option<String>,
    pub date: Option<String>,
    pub fen: Option<String>,
    pub moves: Vec<SanPlus>,
}

impl PgnGame {
    /// Which side `player` had in this game, matched case- and
    /// normalization-insensitively. White wins a tie.
    pub fn side_of(&self, player: &str) -> Option<Color> {
        let wanted = normalize_name(player);
        if wanted.is_empty() {
            return None;
        }
        if self.white.as_deref().map(normalize_name).as_deref() == Some(wanted.as_str()) {
            return Some(Color::White);
        }
        if self.black.as_deref().map(normalize_name).as_deref() == Some(wanted.as_str()) {
            return Some(Color::Black);
        }
        None
    }

    pub fn start_position(&self) -> Result<Chess> {
        match self.fen.as_deref() {
            Some(fen) => parse_position(fen),
            None => Ok(Chess::default()),
        }
    }

    pub fn date_or_unknown(&self) -> String {
        self.date.clone().unwrap_or_else(|| UNKNOWN_DATE.to_string())
    }
}

pub fn normalize_name(s: &str) -> String {
    s.trim().nfkc().collect::<String>().to_lowercase()
}

#[derive(Default)]
struct HeaderFields {
    white: String,
    black: String,
    date: String,
    utc_date: String,
    fen: String,
}

impl HeaderFields {
    fn opt_take(field: &mut String) -> Option<String> {
        if field.is_empty() {
            None
        } else {
            Some(mem::take(field))
        }
    }

    fn set_known_tag(&mut self, key: &[u8], value: RawTag<'_>) {
        let slot: &mut String = match key {
            b"White" => &mut self.white,
            b"Black" => &mut self.black,
            b"Date" => &mut self.date,
            b"UTCDate" => &mut self.utc_date,
            b"FEN" => &mut self.fen,
            _ => return,
        };

        if !slot.is_empty() {
            return;
        }

        let decoded = String::from_utf8_lossy(value.as_bytes());
        let trimmed = decoded.trim();
        if trimmed.is_empty() || trimmed == "?" {
            return;
        }
        *slot = trimmed.to_string();
    }

    fn date(&mut self) -> Option<String> {
        let date = Self::opt_take(&mut self.date).filter(|d| d != UNKNOWN_DATE);
        date.or_else(|| Self::opt_take(&mut self.utc_date))
    }
}

/// Mainline visitor: keeps a few headers and the SAN moves, skips variations.
struct GameVisitor {
    headers: HeaderFields,
}

impl Visitor for GameVisitor {
    type Tags = ();
    type Movetext = Vec<SanPlus>;
    type Output = PgnGame;

    fn begin_tags(&mut self) -> ControlFlow<Self::Output, Self::Tags> {
        self.headers = HeaderFields::default();
        ControlFlow::Continue(())
    }

    fn tag(
        &mut self,
        _: &mut Self::Tags,
        key: &[u8],
        value: RawTag<'_>,
    ) -> ControlFlow<Self::Output> {
        self.headers.set_known_tag(key, value);
        ControlFlow::Continue(())
    }

    fn begin_movetext(&mut self, _: Self::Tags) -> ControlFlow<Self::Output, Self::Movetext> {
        ControlFlow::Continue(Vec::with_capacity(96))
    }

    fn begin_variation(&mut self, _: &mut Self::Movetext) -> ControlFlow<Self::Output, Skip> {
        ControlFlow::Continue(Skip(true))
    }

    fn san(&mut self, movetext: &mut Self::Movetext, san: SanPlus) -> ControlFlow<Self::Output> {
        movetext.push(san);
        ControlFlow::Continue(())
    }

    fn end_game(&mut self, movetext: Self::Movetext) -> Self::Output {
        PgnGame {
            index: 0,
            white: HeaderFields::opt_take(&mut self.headers.white),
            black: HeaderFields::opt_take(&mut self.headers.black),
            date: self.headers.date(),
            fen: HeaderFields::opt_take(&mut self.headers.fen),
            moves: movetext,
        }
    }
}

/// Reads games without keeping anything; used to fast-forward on resume.
struct SkipVisitor;

impl Visitor for SkipVisitor {
    type Tags = ();
    type Movetext = ();
    type Output = ();

    fn begin_tags(&mut self) -> ControlFlow<Self::Output, Self::Tags> {
        ControlFlow::Continue(())
    }

    fn begin_movetext(&mut self, _: Self::Tags) -> ControlFlow<Self::Output, Self::Movetext> {
        ControlFlow::Continue(())
    }

    fn begin_variation(&mut self, _: &mut Self::Movetext) -> ControlFlow<Self::Output, Skip> {
        ControlFlow::Continue(Skip(true))
    }

    fn end_game(&mut self, _: Self::Movetext) -> Self::Output {}
}

/// Sequential reader over a PGN file that numbers games from 0.
pub struct Archive {
    path: PathBuf,
    reader: Reader<File>,
    visitor: GameVisitor,
    next_index: u64,
}

impl Archive {
    pub fn open(path: &Path) -> Result<Self> {
        let file =
            File::open(path).with_context(|| format!("open archive: {}", path.display()))?;
        Ok(Self {
            path: path.to_path_buf(),
            reader: Reader::new(file),
            visitor: GameVisitor {
                headers: HeaderFields::default(),
            },
            next_index: 0,
        })
    }

    pub fn next_game(&mut self) -> Result<Option<PgnGame>> {
        let game = self
            .reader
            .read_game(&mut self.visitor)
            .with_context(|| format!("reading game {} from {}", self.next_index, self.path.display()))?;
        Ok(game.map(|mut g| {
            g.index = self.next_index;
            self.next_index += 1;
            g
        }))
    }

    /// Discard up to `n` games. Returns how many were actually skipped,
    /// which is less than `n` only when the archive ended first.
    pub fn skip_games(&mut self, n: u64) -> Result<u64> {
        let mut skipped = 0;
        while skipped < n {
            let read = self
                .reader
                .read_game(&mut SkipVisitor)
                .with_context(|| format!("skipping game {} in {}", self.next_index, self.path.display()))?;
            if read.is_none() {
                break;
            }
            skipped += 1;
            self.next_index += 1;
        }
        Ok(skipped)
    }

    /// Start over from byte 0.
    pub fn rewind(&mut self) -> Result<()> {
        *self = Self::open(&self.path)?;
        Ok(())
    }
}
