use std::io::Write as _;

use perl_vm::io::{self, StandardInput};
use perl_vm::prelude::*;

#[test]
fn closed_handle_fails_every_operation_and_close_stays_idempotent() {
    let mut handle = ScalarFile::from_bytes(b"data".to_vec());
    handle.close().unwrap();

    assert!(matches!(
        handle.read(4, Charset::utf8()),
        Err(IoError::Closed)
    ));
    assert!(matches!(handle.write(b"x"), Err(IoError::Closed)));
    assert!(matches!(handle.flush(), Err(IoError::Closed)));
    assert!(matches!(handle.seek(0, Whence::Set), Err(IoError::Closed)));
    assert!(matches!(handle.truncate(0), Err(IoError::Closed)));

    // Second close succeeds.
    handle.close().unwrap();
}

#[test]
fn closed_sentinel_behaves_like_a_closed_handle() {
    let mut sentinel = ClosedHandle;

    assert!(matches!(
        sentinel.read(1, Charset::utf8()),
        Err(IoError::Closed)
    ));
    assert!(matches!(sentinel.write(b"x"), Err(IoError::Closed)));
    assert!(sentinel.eof());
    sentinel.close().unwrap();
}

#[test]
fn file_handle_full_lifecycle() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("notes.txt");

    let mut out = FileHandle::open(&path, OpenMode::Write).unwrap();
    assert_eq!(out.write(b"one\ntwo\n").unwrap(), 8);
    out.close().unwrap();

    let mut input = FileHandle::open(&path, OpenMode::Read).unwrap();
    assert_eq!(input.read(4, Charset::utf8()).unwrap(), "one\n");
    assert_eq!(input.tell(), 4);
    assert!(!input.eof());

    assert_eq!(input.read(64, Charset::utf8()).unwrap(), "two\n");
    assert!(input.eof());
    assert_eq!(input.read(8, Charset::utf8()).unwrap(), "");

    // Seek clears EOF.
    input.seek(0, Whence::Set).unwrap();
    assert!(!input.eof());
    assert!(input.fileno().is_some());
    input.close().unwrap();

    let mut rw = FileHandle::open(&path, OpenMode::ReadWrite).unwrap();
    rw.truncate(3).unwrap();
    assert_eq!(rw.read(16, Charset::utf8()).unwrap(), "one");
    rw.close().unwrap();
}

#[test]
fn append_mode_appends() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("log");

    let mut first = FileHandle::open(&path, OpenMode::Write).unwrap();
    first.write(b"a").unwrap();
    first.close().unwrap();

    let mut second = FileHandle::open(&path, OpenMode::Append).unwrap();
    second.write(b"b").unwrap();
    second.close().unwrap();

    let mut check = FileHandle::open(&path, OpenMode::Read).unwrap();
    assert_eq!(check.read(8, Charset::utf8()).unwrap(), "ab");
    check.close().unwrap();
}

#[test]
fn directory_handle_lists_dot_entries_first() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::File::create(dir.path().join("f1")).unwrap();
    std::fs::File::create(dir.path().join("f2")).unwrap();

    let mut d = DirectoryHandle::open(dir.path()).unwrap();
    assert_eq!(d.readdir().unwrap().as_deref(), Some("."));
    assert_eq!(d.readdir().unwrap().as_deref(), Some(".."));

    let mut rest = vec![];
    while let Some(name) = d.readdir().unwrap() {
        rest.push(name);
    }
    rest.sort();
    assert_eq!(rest, vec!["f1".to_string(), "f2".to_string()]);

    // telldir positions index the materialised list.
    d.seekdir(1).unwrap();
    assert_eq!(d.telldir(), 1);
    assert_eq!(d.readdir().unwrap().as_deref(), Some(".."));

    d.rewinddir().unwrap();
    assert_eq!(d.readdir().unwrap().as_deref(), Some("."));

    d.closedir().unwrap();
    d.closedir().unwrap();
    assert!(matches!(d.readdir(), Err(IoError::Closed)));
}

#[test]
fn backing_handles_provide_ungetc() {
    let mut f = ScalarFile::from_bytes(b"xyz".to_vec());
    f.ungetc('q' as i32).unwrap();
    assert_eq!(f.read(2, Charset::utf8()).unwrap(), "qx");

    // -1 is a no-op everywhere.
    f.ungetc(-1).unwrap();
    assert_eq!(f.read(1, Charset::utf8()).unwrap(), "y");

    f.close().unwrap();
    assert!(matches!(f.ungetc('q' as i32), Err(IoError::Closed)));

    // Write-only shapes refuse push-back.
    let mut out = StandardStream::stderr();
    assert!(matches!(out.ungetc('q' as i32), Err(IoError::Unsupported(_))));
    out.close().unwrap();

    let mut sentinel = ClosedHandle;
    assert!(matches!(sentinel.ungetc('q' as i32), Err(IoError::Closed)));
}

#[test]
fn file_seek_clears_pushed_back_characters() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("data");

    let mut out = FileHandle::open(&path, OpenMode::Write).unwrap();
    out.write(b"ab").unwrap();
    out.close().unwrap();

    let mut input = FileHandle::open(&path, OpenMode::Read).unwrap();
    input.ungetc('z' as i32).unwrap();
    input.seek(0, Whence::Set).unwrap();
    assert_eq!(input.read(2, Charset::utf8()).unwrap(), "ab");
    input.close().unwrap();
}

#[test]
fn failures_set_the_process_wide_last_error() {
    let mut handle = LayeredHandle::new(Box::new(ClosedHandle));
    let _ = handle.write(b"x");

    assert!(io::last_error().contains("closed"));
}

#[test]
fn socket_listen_accept_and_sockaddr_packing() {
    let mut server = SocketHandle::new();
    server.bind("127.0.0.1:0").unwrap();
    server.listen(1).unwrap();

    let packed = server.local_sockaddr().unwrap();
    assert_eq!(packed[..2], [0, 2]);
    let port = u16::from_be_bytes([packed[2], packed[3]]);
    assert!(port != 0);
    assert_eq!(packed[4..8], [127, 0, 0, 1]);
    assert_eq!(packed[8..], [0; 8]);

    let client = std::thread::spawn(move || {
        let mut stream = std::net::TcpStream::connect(("127.0.0.1", port)).unwrap();
        stream.write_all(b"ping").unwrap();
    });

    let mut conn = server.accept().unwrap();
    assert_eq!(conn.read(4, Charset::utf8()).unwrap(), "ping");
    client.join().unwrap();

    // Listener keeps listening after accept; byte positions are meaningless.
    assert!(matches!(
        conn.seek(0, Whence::Set),
        Err(IoError::Unsupported(_))
    ));
    assert!(matches!(conn.truncate(0), Err(IoError::Unsupported(_))));
    assert_eq!(conn.tell(), -1);

    conn.close().unwrap();
    server.close().unwrap();
}

#[test]
fn socket_state_machine_rejects_out_of_order_transitions() {
    let mut s = SocketHandle::new();
    assert!(matches!(s.listen(1), Err(IoError::Unsupported(_))));
    assert!(matches!(s.accept(), Err(IoError::Unsupported(_))));

    s.close().unwrap();
    assert!(matches!(s.bind("127.0.0.1:0"), Err(IoError::Closed)));
}

#[test]
fn stdin_handle_reports_fileno() {
    let input = StandardInput::new();
    assert_eq!(input.fileno(), Some(0));
    assert!(!input.eof());
}

#[test]
fn layered_facade_over_a_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("crlf.txt");

    let file = FileHandle::open(&path, OpenMode::Write).unwrap();
    let mut out = LayeredHandle::with_layers(Box::new(file), ":crlf").unwrap();
    out.write_str("a\nb\n").unwrap();
    out.close().unwrap();

    let mut raw = FileHandle::open(&path, OpenMode::Read).unwrap();
    assert_eq!(raw.read(16, Charset::bytes()).unwrap(), "a\r\nb\r\n");
    raw.close().unwrap();

    let back = FileHandle::open(&path, OpenMode::Read).unwrap();
    let mut layered = LayeredHandle::with_layers(Box::new(back), ":crlf").unwrap();
    assert_eq!(layered.read(16, Charset::utf8()).unwrap(), "a\nb\n");
    layered.close().unwrap();
}
