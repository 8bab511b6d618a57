//! Descriptive records for audit and reporting.

use serde::Serialize;
use std::time::SystemTime;

use crate::error::VfsResult;
use crate::ops::FileSystem;
use crate::types::Entry;

/// Flat, serializable description of one entry as seen from a filesystem.
///
/// Numeric ids are strings and are empty when zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileRecord {
    pub ctime: SystemTime,
    pub mtime: SystemTime,
    /// Absolute parent directory.
    pub directory: String,
    pub name: String,
    /// Absolute path.
    pub path: String,
    pub inode: String,
    pub mode: String,
    pub owner: String,
    pub uid: String,
    pub gid: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    /// Regular files only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

/// Describe `entry`, resolving its paths against the root of `fs`.
pub fn file_record(fs: &dyn FileSystem, entry: &Entry) -> VfsResult<FileRecord> {
    let root = fs.root()?;
    let sep = fs.path_separator();
    let attrs = entry.attributes();
    let regular = !entry.is_dir();

    Ok(FileRecord {
        ctime: attrs.ctime(),
        mtime: attrs.mtime(),
        directory: join_clean(sep, &[&root, entry.dir()]),
        name: entry.name().to_string(),
        path: join_clean(sep, &[&root, entry.path()]),
        inode: id_string(attrs.inode()),
        mode: id_string(u64::from(entry.mode().bits())),
        owner: attrs.owner().to_string(),
        uid: id_string(u64::from(attrs.uid())),
        gid: id_string(u64::from(attrs.gid())),
        mime_type: (regular && !attrs.mime_type().is_empty())
            .then(|| attrs.mime_type().to_string()),
        size: regular.then(|| entry.size()),
    })
}

fn id_string(id: u64) -> String {
    if id == 0 { String::new() } else { id.to_string() }
}

/// Join `parts` with `sep`, dropping empty and `"."` segments and applying `".."`.
fn join_clean(sep: &str, parts: &[&str]) -> String {
    let absolute = parts
        .iter()
        .find(|p| !p.is_empty())
        .is_some_and(|p| p.starts_with(sep) || p.starts_with('/'));

    let mut segments: Vec<&str> = Vec::new();
    for part in parts {
        for segment in part.split(|c: char| c == '/' || sep.contains(c)) {
            match segment {
                "" | "." => {}
                ".." => {
                    segments.pop();
                }
                s => segments.push(s),
            }
        }
    }

    let joined = segments.join(sep);
    match (absolute, joined.is_empty()) {
        (true, _) => format!("{sep}{joined}"),
        (false, true) => ".".to_string(),
        (false, false) => joined,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::MemFs;
    use crate::types::FileMode;

    #[test]
    fn test_join_clean() {
        assert_eq!(join_clean("/", &["/", "a/b"]), "/a/b");
        assert_eq!(join_clean("/", &["/", "."]), "/");
        assert_eq!(join_clean("/", &["/srv/", "./x/../y"]), "/srv/y");
        assert_eq!(join_clean("/", &["rel", "z"]), "rel/z");
        assert_eq!(join_clean("/", &["", ""]), ".");
    }

    #[test]
    fn test_record_for_file() {
        let fs = MemFs::new();
        fs.write_file("docs/guide.md", b"12345", FileMode::file(0o644)).unwrap();
        let entry = fs.stat("docs/guide.md").unwrap();
        let record = file_record(&fs, &entry).unwrap();

        assert_eq!(record.path, "/docs/guide.md");
        assert_eq!(record.directory, "/docs");
        assert_eq!(record.name, "guide.md");
        assert_eq!(record.size, Some(5));
        assert_eq!(record.mode, (FileMode::file(0o644).bits()).to_string());
        assert_eq!(record.uid, "");
        assert_eq!(record.gid, "");
        assert!(!record.inode.is_empty());
        assert_eq!(record.mime_type, None);
    }

    #[test]
    fn test_record_for_directory() {
        let fs = MemFs::new();
        fs.mkdir("docs", FileMode::dir(0o755)).unwrap();
        let entry = fs.stat("docs").unwrap();
        let record = file_record(&fs, &entry).unwrap();
        assert_eq!(record.path, "/docs");
        assert_eq!(record.directory, "/");
        assert_eq!(record.size, None);

        let json = serde_json::to_value(&record).unwrap();
        assert!(json.get("size").is_none());
        assert_eq!(json["uid"], "");
    }

    #[test]
    fn test_record_through_sub_view() {
        let fs = MemFs::new();
        fs.write_file("srv/www/index.html", b"<p>", FileMode::file(0o644)).unwrap();
        let sub = fs.sub("srv").unwrap();
        let entry = sub.stat("www/index.html").unwrap();
        let record = file_record(&sub, &entry).unwrap();
        assert_eq!(record.path, "/srv/www/index.html");
        assert_eq!(record.directory, "/srv/www");
    }
}
