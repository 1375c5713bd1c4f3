//! Versioned on-disk codec state.
//!
//! Every codec saves into a directory holding a single JSON document:
//!
//! ```json
//! {"format_version": 1, "codec": {"kind": "dct", "scale": 10.0, ...}}
//! ```

use std::{
    fs,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::{
    bin_codec::{BinCodec, BinCodecConfig},
    codec::ActionCodec,
    dct_codec::DctCodec,
    error::{CodecError, PersistError},
    processor::ProcessorState,
    types::CodecKind,
};

/// File written inside the save directory.
pub const STATE_FILE: &str = "action_tokenizer.json";

/// Bumped whenever the persisted layout changes incompatibly.
pub const FORMAT_VERSION: u32 = 1;

/// Serialized state of any codec, tagged by kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum CodecState {
    Bin(BinCodecConfig),
    Dct(ProcessorState),
}

impl CodecState {
    pub fn kind(&self) -> CodecKind {
        match self {
            Self::Bin(_) => CodecKind::Bin,
            Self::Dct(_) => CodecKind::Dct,
        }
    }
}

#[derive(Serialize)]
struct Document<'a> {
    format_version: u32,
    codec: &'a CodecState,
}

/// Read in two passes so a newer file is reported as a version mismatch
/// rather than a field error.
#[derive(Deserialize)]
struct Header {
    format_version: u32,
}

#[derive(Deserialize)]
struct OwnedDocument {
    codec: CodecState,
}

pub fn state_path(dir: &Path) -> PathBuf {
    dir.join(STATE_FILE)
}

/// Writes `state` to `dir/action_tokenizer.json`.
///
/// # Errors
///
/// Returns [`PersistError::Io`] if the directory or file cannot be written.
pub fn write_state(dir: &Path, state: &CodecState) -> Result<(), PersistError> {
    fs::create_dir_all(dir).map_err(|source| PersistError::Io {
        path: dir.to_path_buf(),
        source,
    })?;
    let path = state_path(dir);
    let json = serde_json::to_string_pretty(&Document {
        format_version: FORMAT_VERSION,
        codec: state,
    })?;
    fs::write(&path, json).map_err(|source| PersistError::Io {
        path: path.clone(),
        source,
    })?;
    log::info!("saved {} action tokenizer to {}", state.kind(), path.display());
    Ok(())
}

/// Reads the codec state saved in `dir`.
///
/// # Errors
///
/// Returns [`PersistError::Io`] for a missing file, [`PersistError::Json`]
/// for malformed contents and [`PersistError::UnsupportedVersion`] for files
/// written with a different format version.
pub fn read_state(dir: &Path) -> Result<CodecState, PersistError> {
    let path = state_path(dir);
    let json = fs::read_to_string(&path).map_err(|source| PersistError::Io {
        path: path.clone(),
        source,
    })?;

    let header: Header = serde_json::from_str(&json)?;
    if header.format_version != FORMAT_VERSION {
        return Err(PersistError::UnsupportedVersion {
            found: header.format_version,
            supported: FORMAT_VERSION,
        });
    }
    let doc: OwnedDocument = serde_json::from_str(&json)?;
    Ok(doc.codec)
}

/// Loads whichever codec kind was saved in `dir`.
pub fn load_codec(dir: &Path) -> Result<Box<dyn ActionCodec>, CodecError> {
    Ok(match read_state(dir)? {
        CodecState::Bin(config) => Box::new(BinCodec::new(config)?),
        CodecState::Dct(state) => Box::new(DctCodec::from_state(state)?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processor::ProcessorConfig;

    #[test]
    fn test_state_file_layout() {
        let dir = tempfile::tempdir().expect("tempdir");
        let state = CodecState::Bin(BinCodecConfig::default());
        write_state(dir.path(), &state).expect("writes");

        let raw = fs::read_to_string(state_path(dir.path())).expect("file exists");
        let value: serde_json::Value = serde_json::from_str(&raw).expect("valid json");
        assert_eq!(value["format_version"], 1);
        assert_eq!(value["codec"]["kind"], "bin");
        assert_eq!(read_state(dir.path()).expect("reads"), state);
    }

    #[test]
    fn test_creates_missing_directory() {
        let dir = tempfile::tempdir().expect("tempdir");
        let nested = dir.path().join("a").join("b");
        write_state(&nested, &CodecState::Bin(BinCodecConfig::default())).expect("writes");
        assert!(state_path(&nested).is_file());
    }

    #[test]
    fn test_unfitted_dct_state_round_trips() {
        let dir = tempfile::tempdir().expect("tempdir");
        let state = CodecState::Dct(ProcessorState {
            config: ProcessorConfig::default(),
            vocabulary: None,
        });
        write_state(dir.path(), &state).expect("writes");
        assert_eq!(read_state(dir.path()).expect("reads"), state);
    }

    #[test]
    fn test_rejects_other_versions() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(
            state_path(dir.path()),
            r#"{"format_version": 7, "codec": {"kind": "future"}}"#,
        )
        .expect("writes");
        assert!(matches!(
            read_state(dir.path()),
            Err(PersistError::UnsupportedVersion {
                found: 7,
                supported: 1
            })
        ));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert!(matches!(read_state(dir.path()), Err(PersistError::Io { .. })));
    }

    #[test]
    fn test_garbage_is_json_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(state_path(dir.path()), "not json").expect("writes");
        assert!(matches!(read_state(dir.path()), Err(PersistError::Json(_))));
    }

    #[test]
    fn test_load_codec_dispatches_on_kind() {
        let dir = tempfile::tempdir().expect("tempdir");
        write_state(dir.path(), &CodecState::Bin(BinCodecConfig::default())).expect("writes");
        let codec = load_codec(dir.path()).expect("loads");
        assert_eq!(codec.kind(), CodecKind::Bin);
        assert_eq!(codec.vocab_size(), 1000);
    }
}
