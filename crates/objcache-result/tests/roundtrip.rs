use std::fs;
use std::path::{Path, PathBuf};

use objcache_result::{
    Consumer, ContainerHeader, Context, EntryKind, FileSizeAndCountDiff, FileType, Reader,
    ResultConfig, ResultError, Writer, RESULT_VERSION,
};
use objcache_storage::StorageError;

#[derive(Debug, Default)]
struct Recorder {
    headers: usize,
    entries: Vec<Recorded>,
    events: Vec<&'static str>,
}

#[derive(Debug, PartialEq, Eq)]
struct Recorded {
    number: u32,
    file_type: FileType,
    len: u64,
    raw_path: Option<PathBuf>,
    data: Vec<u8>,
}

impl Consumer for Recorder {
    fn on_header(&mut self, _header: &ContainerHeader, format_version: u8) -> objcache_result::Result<()> {
        assert_eq!(format_version, RESULT_VERSION);
        self.headers += 1;
        self.events.push("header");
        Ok(())
    }

    fn on_entry_start(
        &mut self,
        entry_number: u32,
        file_type: FileType,
        kind: &EntryKind,
    ) -> objcache_result::Result<()> {
        self.events.push("start");
        self.entries.push(Recorded {
            number: entry_number,
            file_type,
            len: kind.len(),
            raw_path: kind.raw_path().map(Path::to_path_buf),
            data: Vec::new(),
        });
        Ok(())
    }

    fn on_entry_data(&mut self, data: &[u8]) -> objcache_result::Result<()> {
        self.events.push("data");
        self.entries
            .last_mut()
            .expect("data before entry start")
            .data
            .extend_from_slice(data);
        Ok(())
    }

    fn on_entry_end(&mut self) -> objcache_result::Result<()> {
        self.events.push("end");
        Ok(())
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter("objcache=trace")
        .try_init();
}

/// Deterministic bytes that do not compress well.
fn noise(len: usize, seed: u64) -> Vec<u8> {
    let mut state = seed | 1;
    (0..len)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            state as u8
        })
        .collect()
}

fn ctx(dir: &Path, config: ResultConfig) -> Context {
    Context::new(config, "foo.o", dir)
}

fn write_file(dir: &Path, name: &str, contents: &[u8]) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, contents).unwrap();
    path
}

fn read_all(result_path: &Path) -> (objcache_result::Result<()>, Recorder) {
    let mut recorder = Recorder::default();
    let result = Reader::new(result_path).read(&mut recorder);
    (result, recorder)
}

#[test]
fn round_trip_preserves_order_types_and_payloads() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let ctx = ctx(dir.path(), ResultConfig::default());

    let stderr = write_file(dir.path(), "stderr", b"warning: unused variable\n");
    let object = write_file(dir.path(), "foo.o", &noise(100_000, 1));
    let dep = write_file(dir.path(), "foo.d", b"foo.o: foo.c foo.h\n");
    let empty_su = write_file(dir.path(), "foo.su", b"");
    let dwo = write_file(dir.path(), "foo.dwo", &noise(3000, 2));

    let result_path = dir.path().join("0123456789abcdefR");
    let mut writer = Writer::new(&ctx, &result_path);
    writer.write(FileType::StderrOutput, &stderr).unwrap();
    writer.write(FileType::Object, &object).unwrap();
    writer.write(FileType::Dependency, &dep).unwrap();
    writer.write(FileType::StackUsage, &empty_su).unwrap();
    writer.write(FileType::DwarfObject, &dwo).unwrap();
    let diff = writer.finalize().unwrap();
    assert_eq!(diff.count, 3);

    let (result, recorder) = read_all(&result_path);
    result.unwrap();
    assert_eq!(recorder.headers, 1);

    let expected = vec![
        Recorded {
            number: 0,
            file_type: FileType::StderrOutput,
            len: 25,
            raw_path: None,
            data: fs::read(&stderr).unwrap(),
        },
        Recorded {
            number: 1,
            file_type: FileType::Object,
            len: 100_000,
            raw_path: Some(dir.path().join("0123456789abcdef1W")),
            data: Vec::new(),
        },
        Recorded {
            number: 2,
            file_type: FileType::Dependency,
            len: 19,
            raw_path: None,
            data: fs::read(&dep).unwrap(),
        },
        Recorded {
            number: 3,
            file_type: FileType::StackUsage,
            len: 0,
            raw_path: None,
            data: Vec::new(),
        },
        Recorded {
            number: 4,
            file_type: FileType::DwarfObject,
            len: 3000,
            raw_path: Some(dir.path().join("0123456789abcdef4W")),
            data: Vec::new(),
        },
    ];
    assert_eq!(recorder.entries, expected);

    assert_eq!(
        fs::read(dir.path().join("0123456789abcdef1W")).unwrap(),
        fs::read(&object).unwrap()
    );
    assert_eq!(
        fs::read(dir.path().join("0123456789abcdef4W")).unwrap(),
        fs::read(&dwo).unwrap()
    );

    // Every entry ends before the next one starts; the empty entry gets no data.
    assert_eq!(
        recorder.events,
        vec![
            "header", "start", "data", "end", "start", "end", "start", "data", "end", "start",
            "end", "start", "end"
        ]
    );
}

#[test]
fn scenario_object_and_stderr() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = ctx(dir.path(), ResultConfig::default());

    let object = write_file(dir.path(), "foo.o", &noise(2 * 1024 * 1024, 7));
    let stderr = write_file(dir.path(), "stderr", &[b'x'; 40]);

    let result_path = dir.path().join("entryR");
    let mut writer = Writer::new(&ctx, &result_path);
    writer.write(FileType::Object, &object).unwrap();
    writer.write(FileType::StderrOutput, &stderr).unwrap();
    let diff = writer.finalize().unwrap();

    assert_eq!(diff.count, 2);
    assert!(
        diff.size_kibibyte >= 2048 && diff.size_kibibyte < 4096,
        "{diff:?}"
    );

    let (result, recorder) = read_all(&result_path);
    result.unwrap();
    assert_eq!(recorder.entries.len(), 2);

    let object_entry = &recorder.entries[0];
    assert_eq!(object_entry.file_type, FileType::Object);
    assert_eq!(object_entry.len, 2 * 1024 * 1024);
    assert_eq!(object_entry.raw_path, Some(dir.path().join("entry0W")));
    assert!(object_entry.data.is_empty());

    let stderr_entry = &recorder.entries[1];
    assert_eq!(stderr_entry.file_type, FileType::StderrOutput);
    assert_eq!(stderr_entry.data, vec![b'x'; 40]);
    assert_eq!(stderr_entry.raw_path, None);
}

#[test]
fn flipped_magic_byte_delivers_no_callbacks() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = ctx(dir.path(), ResultConfig::default());
    let stderr = write_file(dir.path(), "stderr", b"hello");
    let result_path = dir.path().join("entryR");

    let mut writer = Writer::new(&ctx, &result_path);
    writer.write(FileType::StderrOutput, &stderr).unwrap();
    writer.finalize().unwrap();

    let mut bytes = fs::read(&result_path).unwrap();
    bytes[0] ^= 0xff;
    fs::write(&result_path, &bytes).unwrap();

    let (result, recorder) = read_all(&result_path);
    let err = result.unwrap_err();
    assert!(
        matches!(err, ResultError::Storage(StorageError::BadMagic { .. })),
        "{err:?}"
    );
    assert!(!err.to_string().is_empty());
    assert!(recorder.events.is_empty());
}

#[test]
fn version_mismatch_delivers_no_callbacks() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = ctx(dir.path(), ResultConfig::default());
    let result_path = dir.path().join("entryR");
    Writer::new(&ctx, &result_path).finalize().unwrap();

    let mut bytes = fs::read(&result_path).unwrap();
    bytes[4] = RESULT_VERSION + 1;
    fs::write(&result_path, &bytes).unwrap();

    let (result, recorder) = read_all(&result_path);
    let err = result.unwrap_err();
    assert!(
        matches!(
            err,
            ResultError::Storage(StorageError::UnsupportedVersion { expected, found })
                if expected == RESULT_VERSION && found == RESULT_VERSION + 1
        ),
        "{err:?}"
    );
    assert!(!err.to_string().is_empty());
    assert!(recorder.events.is_empty());
}

#[test]
fn empty_writer_produces_readable_entry() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = ctx(dir.path(), ResultConfig::default());
    let result_path = dir.path().join("emptyR");

    let diff = Writer::new(&ctx, &result_path).finalize().unwrap();
    assert_eq!(diff.count, 1);

    let (result, recorder) = read_all(&result_path);
    result.unwrap();
    assert_eq!(recorder.events, vec!["header"]);
}

#[test]
fn unknown_file_type_survives_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = ctx(dir.path(), ResultConfig::default());
    let future = write_file(dir.path(), "future", b"from a newer writer");
    let result_path = dir.path().join("entryR");

    let mut writer = Writer::new(&ctx, &result_path);
    writer.write(FileType::Unknown(42), &future).unwrap();
    writer.finalize().unwrap();

    let (result, recorder) = read_all(&result_path);
    result.unwrap();
    assert_eq!(recorder.entries.len(), 1);
    assert_eq!(recorder.entries[0].file_type, FileType::Unknown(42));
    assert_eq!(recorder.entries[0].data, b"from a newer writer");
}

#[test]
fn unknown_wrapper_of_a_known_code_reads_back_as_that_type() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = ctx(dir.path(), ResultConfig::default());
    let object = write_file(dir.path(), "foo.o", b"\x7fELF object");
    let result_path = dir.path().join("entryR");

    let mut writer = Writer::new(&ctx, &result_path);
    writer.write(FileType::Unknown(0), &object).unwrap();
    writer.finalize().unwrap();

    let (result, recorder) = read_all(&result_path);
    result.unwrap();
    assert_eq!(recorder.entries.len(), 1);
    assert_eq!(recorder.entries[0].file_type, FileType::Object);
    assert_eq!(
        recorder.entries[0].raw_path,
        Some(dir.path().join("entry0W"))
    );
}

#[test]
fn corrupted_payload_fails_checksum() {
    let dir = tempfile::tempdir().unwrap();
    let config = ResultConfig {
        compression: false,
        ..ResultConfig::default()
    };
    let ctx = ctx(dir.path(), config);
    let stderr = write_file(dir.path(), "stderr", b"0123456789");
    let result_path = dir.path().join("entryR");

    let mut writer = Writer::new(&ctx, &result_path);
    writer.write(FileType::StderrOutput, &stderr).unwrap();
    writer.finalize().unwrap();

    let mut bytes = fs::read(&result_path).unwrap();
    let last = bytes.len() - 1;
    bytes[last] ^= 0x01;
    fs::write(&result_path, &bytes).unwrap();

    let (result, recorder) = read_all(&result_path);
    let err = result.unwrap_err();
    assert!(
        matches!(err, ResultError::Storage(StorageError::HashMismatch { .. })),
        "{err:?}"
    );
    // Data was delivered before the checksum could be checked.
    assert_eq!(recorder.entries.len(), 1);
}

#[test]
fn truncated_result_is_rejected_up_front() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = ctx(dir.path(), ResultConfig::default());
    let stderr = write_file(dir.path(), "stderr", &noise(10_000, 3));
    let result_path = dir.path().join("entryR");

    let mut writer = Writer::new(&ctx, &result_path);
    writer.write(FileType::StderrOutput, &stderr).unwrap();
    writer.finalize().unwrap();

    let bytes = fs::read(&result_path).unwrap();
    fs::write(&result_path, &bytes[..bytes.len() / 2]).unwrap();

    let (result, recorder) = read_all(&result_path);
    let err = result.unwrap_err();
    assert!(
        matches!(err, ResultError::Storage(StorageError::Truncated { .. })),
        "{err:?}"
    );
    assert!(recorder.events.is_empty());
}

#[test]
fn raw_files_can_be_disabled() {
    let dir = tempfile::tempdir().unwrap();
    let config = ResultConfig {
        raw_files: false,
        ..ResultConfig::default()
    };
    let ctx = ctx(dir.path(), config);
    let object = write_file(dir.path(), "foo.o", &noise(5000, 4));
    let result_path = dir.path().join("entryR");

    let mut writer = Writer::new(&ctx, &result_path);
    writer.write(FileType::Object, &object).unwrap();
    let diff = writer.finalize().unwrap();
    assert_eq!(diff.count, 1);
    assert!(!dir.path().join("entry0W").exists());

    let (result, recorder) = read_all(&result_path);
    result.unwrap();
    assert_eq!(recorder.entries[0].raw_path, None);
    assert_eq!(recorder.entries[0].data, fs::read(&object).unwrap());
}

#[test]
fn rewriting_an_entry_does_not_change_the_file_count() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = ctx(dir.path(), ResultConfig::default());
    let object = write_file(dir.path(), "foo.o", &noise(50_000, 5));
    let result_path = dir.path().join("entryR");

    let store = || {
        let mut writer = Writer::new(&ctx, &result_path);
        writer.write(FileType::Object, &object).unwrap();
        writer.finalize().unwrap()
    };

    let first = store();
    assert_eq!(first.count, 2);
    let second = store();
    assert_eq!(second.count, 0);

    let total: FileSizeAndCountDiff = [first, second].into_iter().sum();
    assert_eq!(total.count, 2);
}

#[test]
fn directory_source_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = ctx(dir.path(), ResultConfig::default());
    let result_path = dir.path().join("entryR");

    let mut writer = Writer::new(&ctx, &result_path);
    writer.write(FileType::Diagnostic, dir.path()).unwrap();
    let err = writer.finalize().unwrap_err();
    assert!(matches!(err, ResultError::NotAFile { .. }), "{err:?}");
    assert!(!result_path.exists());
}

#[test]
fn failed_raw_file_removes_result_and_earlier_raw_files() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = ctx(dir.path(), ResultConfig::default());
    let object = write_file(dir.path(), "foo.o", &noise(4096, 8));
    let dwo = write_file(dir.path(), "foo.dwo", &noise(1024, 9));
    let result_path = dir.path().join("entryR");

    // A directory where the second raw file must go makes finalize fail
    // after the container and the first raw file exist.
    fs::create_dir(dir.path().join("entry1W")).unwrap();

    let mut writer = Writer::new(&ctx, &result_path);
    writer.write(FileType::Object, &object).unwrap();
    writer.write(FileType::DwarfObject, &dwo).unwrap();
    let err = writer.finalize().unwrap_err();
    assert!(matches!(err, ResultError::RawFile { .. }), "{err:?}");

    assert!(!result_path.exists());
    assert!(!dir.path().join("entry0W").exists());
    assert!(dir.path().join("entry1W").is_dir());
}

#[cfg(unix)]
#[test]
fn hard_linked_raw_files_share_the_inode() {
    use std::os::unix::fs::MetadataExt;

    let dir = tempfile::tempdir().unwrap();
    let config = ResultConfig {
        hard_link: true,
        ..ResultConfig::default()
    };
    let ctx = ctx(dir.path(), config);
    let object = write_file(dir.path(), "foo.o", b"\x7fELF");
    let result_path = dir.path().join("entryR");

    let mut writer = Writer::new(&ctx, &result_path);
    writer.write(FileType::Object, &object).unwrap();
    writer.finalize().unwrap();

    let raw = fs::metadata(dir.path().join("entry0W")).unwrap();
    assert_eq!(raw.ino(), fs::metadata(&object).unwrap().ino());
}
