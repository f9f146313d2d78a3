use encore_ports::separation::{SeparatedSong, SeparationError, SeparationPort};
use std::path::{Path, PathBuf};

const REFERENCE_SUFFIXES: [&str; 3] = ["_basic_pitch.csv", ".csv", ".mid"];

/// Looks up a song's separated stems and reference notes on disk.
///
/// For a source recording `song.mp3` the stems are expected at
/// `<tracks_dir>/song/<primary>.wav` and `<tracks_dir>/song/<accompaniment>.wav`,
/// and the reference notes at `<notes_dir>/song/<primary>_basic_pitch.csv`
/// (a plain `.csv` or `.mid` with the primary stem's name also works).
#[derive(Clone, Debug)]
pub struct FsSeparatedLibrary {
    tracks_dir: PathBuf,
    notes_dir: PathBuf,
    primary_stem: String,
    accompaniment_stem: String,
}

impl FsSeparatedLibrary {
    pub fn new(tracks_dir: PathBuf, notes_dir: PathBuf) -> Self {
        Self {
            tracks_dir,
            notes_dir,
            primary_stem: "guitar".to_string(),
            accompaniment_stem: "no_guitar".to_string(),
        }
    }

    pub fn with_stems(mut self, primary: &str, accompaniment: &str) -> Self {
        self.primary_stem = primary.to_string();
        self.accompaniment_stem = accompaniment.to_string();
        self
    }

    fn reference_path(&self, song: &str) -> Option<PathBuf> {
        let dir = self.notes_dir.join(song);
        REFERENCE_SUFFIXES
            .iter()
            .map(|suffix| dir.join(format!("{}{}", self.primary_stem, suffix)))
            .find(|path| path.is_file())
    }
}

impl SeparationPort for FsSeparatedLibrary {
    fn separated(&self, source: &Path) -> Result<SeparatedSong, SeparationError> {
        let song = source
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| SeparationError::Backend(format!("invalid source: {}", source.display())))?;

        let song_dir = self.tracks_dir.join(song);
        if !song_dir.is_dir() {
            return Err(SeparationError::NotSeparated(song.to_string()));
        }

        let primary_path = song_dir.join(format!("{}.wav", self.primary_stem));
        let accompaniment_path = song_dir.join(format!("{}.wav", self.accompaniment_stem));
        for path in [&primary_path, &accompaniment_path] {
            if !path.is_file() {
                return Err(SeparationError::MissingOutput(path.display().to_string()));
            }
        }

        let reference_notes_path = self.reference_path(song).ok_or_else(|| {
            SeparationError::MissingOutput(format!("reference notes for {song}"))
        })?;

        Ok(SeparatedSong {
            primary_path,
            accompaniment_path,
            reference_notes_path,
        })
    }
}
