//! Zip archives of plugin directories.
//!
//! Every entry written by [`build_archive`] is named `<plugin>/<relative path>`
//! so that extracting the archive into a plugins root recreates each plugin
//! directory in place. [`extract_archive`] is the inverse used by the update
//! client.

use std::collections::HashSet;
use std::io::{Cursor, Seek, Write};
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::catalog::plugin_dir;
use crate::error::{PlugshipError, PlugshipResult};

/// An in-memory archive and what went into it.
#[derive(Debug, Clone)]
pub struct PluginArchive {
    pub bytes: Vec<u8>,
    /// Plugins found and archived, in request order.
    pub plugins: Vec<String>,
    /// Requested names with no matching directory.
    pub skipped: Vec<String>,
    pub entries: usize,
}

fn entry_options() -> zip::write::SimpleFileOptions {
    zip::write::SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated)
}

fn add_plugin_to_zip<W: Write + Seek>(
    zip: &mut zip::ZipWriter<W>,
    name: &str,
    dir: &Path,
) -> PlugshipResult<usize> {
    let mut written = 0;
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(dir).to_path_buf();
            PlugshipError::io(path, e.into())
        })?;
        let path = entry.path();
        // Symlinked files are archived with their target's bytes.
        if !path.is_file() {
            continue;
        }

        let rel = path.strip_prefix(dir).unwrap_or(path);
        let mut entry_name = name.to_string();
        for component in rel.components() {
            entry_name.push('/');
            entry_name.push_str(&component.as_os_str().to_string_lossy());
        }

        let bytes = std::fs::read(path).map_err(|e| PlugshipError::io(path, e))?;
        zip.start_file(entry_name, entry_options())?;
        zip.write_all(&bytes).map_err(|e| PlugshipError::io(path, e))?;
        written += 1;
    }
    Ok(written)
}

/// Bundle the named plugins under `root` into one deflate-compressed zip.
///
/// Names with no directory under `root` are skipped. Repeated names are
/// archived once.
pub fn build_archive<S: AsRef<str>>(root: &Path, names: &[S]) -> PlugshipResult<PluginArchive> {
    let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let mut seen = HashSet::new();
    let mut plugins = Vec::new();
    let mut skipped = Vec::new();
    let mut entries = 0;

    for name in names {
        let name = name.as_ref();
        if !seen.insert(name) {
            continue;
        }
        match plugin_dir(root, name) {
            Some(dir) => {
                entries += add_plugin_to_zip(&mut zip, name, &dir)?;
                plugins.push(name.to_string());
            }
            None => {
                tracing::debug!("skipping unknown plugin '{}'", name);
                skipped.push(name.to_string());
            }
        }
    }

    let bytes = zip.finish()?.into_inner();
    Ok(PluginArchive {
        bytes,
        plugins,
        skipped,
        entries,
    })
}

/// Extract `bytes` into `dest`, returning the files written.
///
/// Entries whose names would resolve outside `dest` abort the extraction.
pub fn extract_archive(bytes: &[u8], dest: &Path) -> PlugshipResult<Vec<PathBuf>> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))?;
    let mut written = Vec::new();

    for i in 0..archive.len() {
        let mut file = archive.by_index(i)?;
        let raw_name = file.name().to_string();
        let rel = file
            .enclosed_name()
            .ok_or_else(|| PlugshipError::UnsafeEntry(raw_name.clone()))?;
        let out = dest.join(rel);

        if file.is_dir() {
            std::fs::create_dir_all(&out).map_err(|e| PlugshipError::io(&out, e))?;
            continue;
        }
        if let Some(parent) = out.parent() {
            std::fs::create_dir_all(parent).map_err(|e| PlugshipError::io(parent, e))?;
        }
        let mut target = std::fs::File::create(&out).map_err(|e| PlugshipError::io(&out, e))?;
        std::io::copy(&mut file, &mut target).map_err(|e| PlugshipError::io(&out, e))?;
        written.push(out);
    }

    Ok(written)
}

/// Names of all entries in an archive, in archive order.
///
/// Fails with [`PlugshipError::UnsafeEntry`] if any entry would resolve
/// outside the directory it is extracted into.
pub fn entry_names(bytes: &[u8]) -> PlugshipResult<Vec<String>> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))?;
    let mut names = Vec::with_capacity(archive.len());
    for i in 0..archive.len() {
        let file = archive.by_index_raw(i)?;
        if file.enclosed_name().is_none() {
            return Err(PlugshipError::UnsafeEntry(file.name().to_string()));
        }
        names.push(file.name().to_string());
    }
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    fn write(path: &Path, contents: &str) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, contents).unwrap();
    }

    fn read_entry(bytes: &[u8], name: &str) -> String {
        let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        let mut file = archive.by_name(name).unwrap();
        let mut s = String::new();
        file.read_to_string(&mut s).unwrap();
        s
    }

    #[test]
    fn single_file_plugin() {
        let tmp = tempfile::tempdir().unwrap();
        write(&tmp.path().join("A/file.txt"), "hello");

        let archive = build_archive(tmp.path(), &["A"]).unwrap();
        assert_eq!(entry_names(&archive.bytes).unwrap(), vec!["A/file.txt"]);
        assert_eq!(read_entry(&archive.bytes, "A/file.txt"), "hello");
        assert_eq!(archive.entries, 1);
        assert_eq!(archive.plugins, vec!["A"]);
    }

    #[test]
    fn nested_paths_are_rooted_at_plugin_name() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("srv").join("plugins");
        write(&root.join("Tool/main.py"), "print()");
        write(&root.join("Tool/icons/a.png"), "png");
        write(&root.join("Tool/lib/deep/util.py"), "x = 1");
        write(&root.join("Other/x.py"), "");

        let archive = build_archive(&root, &["Tool"]).unwrap();
        let names = entry_names(&archive.bytes).unwrap();
        assert_eq!(
            names,
            vec!["Tool/icons/a.png", "Tool/lib/deep/util.py", "Tool/main.py"]
        );
        let prefix = root.to_string_lossy().to_string();
        assert!(names.iter().all(|n| !n.contains(&prefix) && !n.contains("srv")));
    }

    #[test]
    fn unknown_plugins_are_skipped() {
        let tmp = tempfile::tempdir().unwrap();
        write(&tmp.path().join("A/a.txt"), "a");
        write(&tmp.path().join("B/b.txt"), "b");

        let archive = build_archive(tmp.path(), &["ghost", "A", "B", "gone"]).unwrap();
        assert_eq!(
            entry_names(&archive.bytes).unwrap(),
            vec!["A/a.txt", "B/b.txt"]
        );
        assert_eq!(archive.skipped, vec!["ghost", "gone"]);
    }

    #[test]
    fn traversal_names_are_skipped() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("root");
        write(&root.join("A/a.txt"), "a");
        write(&tmp.path().join("secret/key.txt"), "s");

        let archive = build_archive(&root, &["..", "../secret", "A/..", "A"]).unwrap();
        assert_eq!(entry_names(&archive.bytes).unwrap(), vec!["A/a.txt"]);
        assert_eq!(archive.skipped.len(), 3);
    }

    #[test]
    fn empty_request_is_valid_empty_archive() {
        let tmp = tempfile::tempdir().unwrap();
        let names: [&str; 0] = [];
        let archive = build_archive(tmp.path(), &names).unwrap();
        assert!(entry_names(&archive.bytes).unwrap().is_empty());
        assert_eq!(archive.entries, 0);
    }

    #[test]
    fn repeated_names_archive_once() {
        let tmp = tempfile::tempdir().unwrap();
        write(&tmp.path().join("A/a.txt"), "a");

        let archive = build_archive(tmp.path(), &["A", "A"]).unwrap();
        assert_eq!(entry_names(&archive.bytes).unwrap(), vec!["A/a.txt"]);
    }

    #[test]
    fn empty_directories_produce_no_entries() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(tmp.path().join("A/empty")).unwrap();
        write(&tmp.path().join("A/a.txt"), "a");

        let archive = build_archive(tmp.path(), &["A"]).unwrap();
        assert_eq!(entry_names(&archive.bytes).unwrap(), vec!["A/a.txt"]);
    }

    #[cfg(unix)]
    #[test]
    fn symlinked_files_are_archived_with_target_bytes() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("root");
        write(&root.join("A/main.py"), "import common");
        write(&tmp.path().join("shared/common.py"), "SHARED = 1");
        std::os::unix::fs::symlink(
            tmp.path().join("shared/common.py"),
            root.join("A/common.py"),
        )
        .unwrap();

        let archive = build_archive(&root, &["A"]).unwrap();
        assert_eq!(
            entry_names(&archive.bytes).unwrap(),
            vec!["A/common.py", "A/main.py"]
        );
        assert_eq!(read_entry(&archive.bytes, "A/common.py"), "SHARED = 1");
    }

    #[test]
    fn entry_names_rejects_escaping_entries() {
        let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
        zip.start_file("A/ok.txt", entry_options()).unwrap();
        zip.write_all(b"ok").unwrap();
        zip.start_file("A/../../x.txt", entry_options()).unwrap();
        zip.write_all(b"nope").unwrap();
        let bytes = zip.finish().unwrap().into_inner();

        assert!(matches!(
            entry_names(&bytes),
            Err(PlugshipError::UnsafeEntry(name)) if name == "A/../../x.txt"
        ));
    }

    #[test]
    fn extract_recreates_plugin_tree() {
        let src = tempfile::tempdir().unwrap();
        write(&src.path().join("A/sub/f.txt"), "nested");
        write(&src.path().join("B/g.txt"), "flat");
        let archive = build_archive(src.path(), &["A", "B"]).unwrap();

        let dest = tempfile::tempdir().unwrap();
        let written = extract_archive(&archive.bytes, dest.path()).unwrap();
        assert_eq!(written.len(), 2);
        assert_eq!(
            std::fs::read_to_string(dest.path().join("A/sub/f.txt")).unwrap(),
            "nested"
        );
        assert_eq!(
            std::fs::read_to_string(dest.path().join("B/g.txt")).unwrap(),
            "flat"
        );
    }

    #[test]
    fn extract_rejects_escaping_entries() {
        let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
        zip.start_file("../escape.txt", entry_options()).unwrap();
        zip.write_all(b"nope").unwrap();
        let bytes = zip.finish().unwrap().into_inner();

        let tmp = tempfile::tempdir().unwrap();
        let dest = tmp.path().join("plugins");
        std::fs::create_dir(&dest).unwrap();
        let err = extract_archive(&bytes, &dest).unwrap_err();
        assert!(matches!(err, PlugshipError::UnsafeEntry(_)));
        assert!(!tmp.path().join("escape.txt").exists());
    }
}
