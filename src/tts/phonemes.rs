use std::collections::HashMap;
use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};

use lazy_static::lazy_static;

use super::EngineError;

/// Longest phoneme sequence the model accepts in one pass.
pub const MAX_PHONEME_LENGTH: usize = 510;

/// Kokoro v1.0 symbol table. Id 0 is the pad token and never appears here.
#[rustfmt::skip]
const KOKORO_VOCAB: &[(char, i64)] = &[
    (';', 1), (':', 2), (',', 3), ('.', 4), ('!', 5), ('?', 6), ('—', 9), ('…', 10),
    ('"', 11), ('(', 12), (')', 13), ('“', 14), ('”', 15), (' ', 16), ('\u{0303}', 17),
    ('ʣ', 18), ('ʥ', 19), ('ʦ', 20), ('ʨ', 21), ('ᵝ', 22), ('\u{AB67}', 23),
    ('A', 24), ('I', 25), ('O', 31), ('Q', 33), ('S', 35), ('T', 36), ('W', 39),
    ('Y', 41), ('ᵊ', 42), ('a', 43), ('b', 44), ('c', 45), ('d', 46), ('e', 47),
    ('f', 48), ('h', 50), ('i', 51), ('j', 52), ('k', 53), ('l', 54), ('m', 55),
    ('n', 56), ('o', 57), ('p', 58), ('q', 59), ('r', 60), ('s', 61), ('t', 62),
    ('u', 63), ('v', 64), ('w', 65), ('x', 66), ('y', 67), ('z', 68), ('ɑ', 69),
    ('ɐ', 70), ('ɒ', 71), ('æ', 72), ('β', 75), ('ɔ', 76), ('ɕ', 77), ('ç', 78),
    ('ɖ', 80), ('ð', 81), ('ʤ', 82), ('ə', 83), ('ɚ', 85), ('ɛ', 86), ('ɜ', 87),
    ('ɟ', 90), ('ɡ', 92), ('ɥ', 99), ('ɨ', 101), ('ɪ', 102), ('ʝ', 103), ('ɯ', 110),
    ('ɰ', 111), ('ŋ', 112), ('ɳ', 113), ('ɲ', 114), ('ɴ', 115), ('ø', 116), ('ɸ', 118),
    ('θ', 119), ('œ', 120), ('ɹ', 123), ('ɾ', 125), ('ɻ', 126), ('ʁ', 128), ('ɽ', 129),
    ('ʂ', 130), ('ʃ', 131), ('ʈ', 132), ('ʧ', 133), ('ʊ', 135), ('ʋ', 136), ('ʌ', 138),
    ('ɣ', 139), ('ɤ', 140), ('χ', 142), ('ʎ', 143), ('ʒ', 147), ('ʔ', 148), ('ˈ', 156),
    ('ˌ', 157), ('ː', 158), ('ʰ', 162), ('ʲ', 164), ('↓', 169), ('→', 171), ('↗', 172),
    ('↘', 173), ('ᵻ', 177),
];

lazy_static! {
    static ref VOCAB: HashMap<char, i64> = KOKORO_VOCAB.iter().copied().collect();
}

/// Runs `espeak-ng` to turn text into IPA phonemes.
#[derive(Debug, Clone)]
pub struct EspeakPhonemizer {
    program: PathBuf,
}

impl EspeakPhonemizer {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Phonemize `text`, keeping its punctuation marks in place.
    pub fn phonemize(&self, text: &str, lang: &str) -> Result<String, EngineError> {
        if text.trim().is_empty() {
            return Ok(String::new());
        }
        let merged = join_pieces(&split_punctuation(text), |words| self.espeak(words, lang))?;
        Ok(normalize(&merged))
    }

    /// Raw IPA output of one `espeak-ng` run.
    fn espeak(&self, text: &str, lang: &str) -> Result<String, EngineError> {
        // Text goes through stdin so it can never be read as a flag
        let mut child = Command::new(&self.program)
            .args(["--ipa", "-q", "--stdin", "-v", lang])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                EngineError::Phonemizer(format!(
                    "Failed to run {} (is espeak-ng installed?): {}",
                    self.program.display(),
                    e
                ))
            })?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| EngineError::Phonemizer("espeak-ng stdin unavailable".to_string()))?;
        let input = text.to_string();
        let writer = std::thread::spawn(move || stdin.write_all(input.as_bytes()));

        let output = child
            .wait_with_output()
            .map_err(|e| EngineError::Phonemizer(format!("espeak-ng did not finish: {}", e)))?;
        let sent = writer.join();

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(EngineError::Phonemizer(format!(
                "espeak-ng failed for language '{}': {}",
                lang,
                stderr.trim()
            )));
        }
        match sent {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                return Err(EngineError::Phonemizer(format!(
                    "Failed to send text to espeak-ng: {}",
                    e
                )))
            }
            Err(_) => {
                return Err(EngineError::Phonemizer(
                    "espeak-ng writer thread panicked".to_string(),
                ))
            }
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Marks `espeak-ng` drops from its IPA output but the model has tokens for.
const PUNCTUATION: &[char] = &[
    ';', ':', ',', '.', '!', '?', '—', '…', '"', '(', ')', '“', '”',
];

/// A run of input text: words for the phonemizer, or punctuation kept verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Piece<'a> {
    Words(&'a str),
    Marks(&'a str),
}

fn split_punctuation(text: &str) -> Vec<Piece<'_>> {
    let mut pieces = Vec::new();
    let mut start = 0;
    let mut in_marks = false;
    for (i, ch) in text.char_indices() {
        let is_mark = PUNCTUATION.contains(&ch);
        if is_mark != in_marks && i > start {
            pieces.push(if in_marks {
                Piece::Marks(&text[start..i])
            } else {
                Piece::Words(&text[start..i])
            });
            start = i;
        }
        in_marks = is_mark;
    }
    if start < text.len() {
        pieces.push(if in_marks {
            Piece::Marks(&text[start..])
        } else {
            Piece::Words(&text[start..])
        });
    }
    pieces
}

/// Phonemize the word runs and stitch the marks back between them.
///
/// Whitespace before a word run in the input becomes one space in the output.
fn join_pieces<F>(pieces: &[Piece<'_>], mut phonemize: F) -> Result<String, EngineError>
where
    F: FnMut(&str) -> Result<String, EngineError>,
{
    let mut out = String::new();
    for piece in pieces {
        match *piece {
            Piece::Marks(marks) => out.push_str(marks),
            Piece::Words(words) => {
                if words.starts_with(char::is_whitespace) && !out.is_empty() {
                    out.push(' ');
                }
                if !words.trim().is_empty() {
                    out.push_str(phonemize(words.trim())?.trim());
                }
            }
        }
    }
    Ok(out)
}

/// Map raw espeak output onto the model's symbol set.
///
/// Clause lines are joined with single spaces and symbols the model does not
/// know are dropped.
pub fn normalize(raw: &str) -> String {
    let joined = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    joined
        .chars()
        .map(|ch| match ch {
            'ʲ' => 'j',
            'r' => 'ɹ',
            'x' => 'k',
            'ɬ' => 'l',
            other => other,
        })
        .filter(|ch| VOCAB.contains_key(ch))
        .collect()
}

/// Convert normalized phonemes to token ids, skipping unknown symbols.
pub fn tokenize(phonemes: &str) -> Vec<i64> {
    phonemes
        .chars()
        .filter_map(|ch| VOCAB.get(&ch).copied())
        .collect()
}

/// Split phonemes into pieces of at most `max_len` symbols.
///
/// Breaks at the last space inside each window when there is one.
pub fn split_chunks(phonemes: &str, max_len: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut rest: Vec<char> = phonemes.trim().chars().collect();

    while rest.len() > max_len {
        let cut = rest[..max_len]
            .iter()
            .rposition(|ch| *ch == ' ')
            .filter(|pos| *pos > 0)
            .unwrap_or(max_len);
        let head: String = rest[..cut].iter().collect();
        let head = head.trim();
        if !head.is_empty() {
            chunks.push(head.to_string());
        }
        rest = rest[cut..].iter().copied().skip_while(|ch| *ch == ' ').collect();
    }

    let tail: String = rest.into_iter().collect();
    if !tail.is_empty() {
        chunks.push(tail);
    }
    chunks
}
