use std::{
    fs::File,
    io::{self, Read},
    num::NonZeroUsize,
    path::{Path, PathBuf},
    thread,
};

use log::debug;
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};

const BUFFER_SIZE: usize = 64 * 1024;

/// Computes the lowercase hex encoded SHA-256 digest of everything `reader` yields.
pub fn digest_reader<R: Read>(mut reader: R) -> io::Result<String> {
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; BUFFER_SIZE];
    loop {
        let read = match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(read) => read,
            Err(error) if error.kind() == io::ErrorKind::Interrupted => continue,
            Err(error) => return Err(error),
        };
        hasher.update(&buffer[..read]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Streams the file at `path` through SHA-256. Disk images can be many gigabytes so the file is
/// never read into memory at once.
pub fn digest(path: &Path) -> Result<String> {
    let file = File::open(path).map_err(|error| Error::checksum(path.to_owned(), error))?;
    let checksum = digest_reader(file).map_err(|error| Error::checksum(path.to_owned(), error))?;
    debug!("sha256 {checksum} {path:?}");
    Ok(checksum)
}

fn parallelism() -> usize {
    thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(1)
}

/// Digests every path concurrently and returns the checksums in input order. Waits for every
/// digest to finish. Fails with the first error in input order if any digest fails.
pub fn digest_all(paths: &[PathBuf]) -> Result<Vec<String>> {
    if paths.is_empty() {
        return Ok(Vec::new());
    }

    let workers = parallelism().min(paths.len());
    let chunk_size = paths.len().div_ceil(workers);

    let results: Vec<Result<String>> = thread::scope(|scope| {
        let handles: Vec<_> = paths
            .chunks(chunk_size)
            .map(|chunk| {
                scope.spawn(move || chunk.iter().map(|path| digest(path)).collect::<Vec<_>>())
            })
            .collect();

        handles
            .into_iter()
            .flat_map(|handle| match handle.join() {
                Ok(results) => results,
                Err(payload) => std::panic::resume_unwind(payload),
            })
            .collect()
    });

    results.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    // sha256 of the empty input and of "abc", see FIPS 180-2 appendix B.
    const EMPTY: &str = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";
    const ABC: &str = "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad";

    #[test]
    fn test_known_digests() {
        assert_eq!(digest_reader(&b""[..]).unwrap(), EMPTY);
        assert_eq!(digest_reader(&b"abc"[..]).unwrap(), ABC);
    }

    #[test]
    fn test_digest_spans_multiple_buffers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("large.raw");
        let contents: Vec<u8> = (0..BUFFER_SIZE * 3 + 17).map(|i| i as u8).collect();
        std::fs::write(&path, &contents).unwrap();

        assert_eq!(digest(&path).unwrap(), digest_reader(&contents[..]).unwrap());
    }

    #[test]
    fn test_digest_is_deterministic_and_content_sensitive() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a");
        let b = dir.path().join("b");
        let c = dir.path().join("c");
        std::fs::write(&a, "disk image").unwrap();
        std::fs::write(&b, "disk image").unwrap();
        std::fs::write(&c, "disk imagf").unwrap();

        assert_eq!(digest(&a).unwrap(), digest(&a).unwrap());
        assert_eq!(digest(&a).unwrap(), digest(&b).unwrap());
        assert_ne!(digest(&a).unwrap(), digest(&c).unwrap());
        let checksum = digest(&a).unwrap();
        assert_eq!(checksum.len(), 64);
        assert!(checksum
            .chars()
            .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)));
    }

    #[test]
    fn test_digest_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let error = digest(&dir.path().join("missing")).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::ChecksumFailure);
    }

    #[test]
    fn test_digest_all_keeps_order() {
        let dir = tempfile::tempdir().unwrap();
        let paths: Vec<PathBuf> = (0..9)
            .map(|i| {
                let path = dir.path().join(format!("{i}.raw"));
                std::fs::write(&path, i.to_string()).unwrap();
                path
            })
            .collect();

        let checksums = digest_all(&paths).unwrap();
        let expected: Vec<String> = paths.iter().map(|path| digest(path).unwrap()).collect();
        assert_eq!(checksums, expected);
    }

    #[test]
    fn test_digest_all_fails_if_any_fails() {
        let dir = tempfile::tempdir().unwrap();
        let present = dir.path().join("present");
        std::fs::write(&present, "data").unwrap();
        let paths = vec![present, dir.path().join("missing")];

        let error = digest_all(&paths).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::ChecksumFailure);
    }

    #[test]
    fn test_digest_all_empty() {
        assert!(digest_all(&[]).unwrap().is_empty());
    }
}
