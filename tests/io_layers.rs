use quickcheck_macros::quickcheck;

use perl_vm::prelude::*;
use perl_vm::io::{CrlfLayer, EncodingLayer};

fn mem_handle() -> (LayeredHandle, std::rc::Rc<std::cell::RefCell<Vec<u8>>>) {
    let file = ScalarFile::new();
    let buf = file.buffer();
    (LayeredHandle::new(Box::new(file)), buf)
}

#[quickcheck]
fn crlf_round_trips_without_lone_cr(input: String) -> bool {
    // The property holds for byte-strings with no lone CR.
    let input: String = input.chars().filter(|c| *c != '\r').collect();

    let mut layer = CrlfLayer::new();
    let wire = layer.process_output(&input);
    let mut back = layer.process_input(&wire);
    back.push_str(&layer.finish_input());

    back == input
}

#[quickcheck]
fn utf8_layer_round_trips(input: String) -> bool {
    let mut layer = EncodingLayer::new("UTF-8").unwrap();
    let wire = layer.process_output(&input);
    let mut back = layer.process_input(&wire);
    back.push_str(&layer.finish_input());

    back == input
}

#[quickcheck]
fn utf16_layer_round_trips(input: String) -> bool {
    let mut layer = EncodingLayer::new("UTF-16").unwrap();
    let wire = layer.process_output(&input);
    let mut back = layer.process_input(&wire);
    back.push_str(&layer.finish_input());

    back == input
}

#[test]
fn utf8_crlf_composition_writes_exact_bytes() {
    let (mut handle, buf) = mem_handle();
    handle.binmode(":encoding(UTF-8):crlf").unwrap();

    handle.write_str("hi\n").unwrap();

    assert_eq!(&*buf.borrow(), &[0x68, 0x69, 0x0D, 0x0A]);
}

#[test]
fn utf16_layered_write_and_read_back() {
    let (mut handle, buf) = mem_handle();
    handle.binmode(":encoding(UTF-16):crlf").unwrap();
    handle.write_str("A\n").unwrap();

    // Default UTF-16: big-endian with a BOM, then 'A', then CR LF.
    assert_eq!(
        &*buf.borrow(),
        &[0xFE, 0xFF, 0x00, 0x41, 0x00, 0x0D, 0x00, 0x0A]
    );

    let mut reader = LayeredHandle::with_layers(
        Box::new(ScalarFile::shared(buf)),
        ":encoding(UTF-16):crlf",
    )
    .unwrap();
    assert_eq!(reader.read(10, Charset::utf8()).unwrap(), "A\n");
}

#[test]
fn binmode_replaces_the_stack_atomically() {
    let (mut handle, _) = mem_handle();

    handle.binmode(":encoding(UTF-8):crlf").unwrap();
    assert_eq!(handle.layer_count(), 2);

    // Unknown layer: error, stack untouched.
    let err = handle.binmode(":crlf:mystery").unwrap_err();
    assert!(matches!(err, IoError::UnknownLayer(ref l) if l == "mystery"));
    assert_eq!(handle.layer_count(), 2);

    handle.binmode(":raw").unwrap();
    assert_eq!(handle.layer_count(), 0);
}

#[test]
fn seek_resets_layer_state() {
    // 127 filler bytes, then a two-byte é straddling the 128-byte chunk
    // boundary of the layered read loop.
    let mut bytes = vec![b'a'; 127];
    bytes.extend_from_slice("é".as_bytes());

    let file = ScalarFile::from_bytes(bytes);
    let mut handle = LayeredHandle::with_layers(Box::new(file), ":encoding(UTF-8)").unwrap();

    // Stop after 127 characters: the é's first byte is now buffered inside
    // the encoding layer.
    let first = handle.read(127, Charset::utf8()).unwrap();
    assert_eq!(first.len(), 127);

    // Seek must drop that partial state or the next read would misdecode.
    handle.seek(0, Whence::Set).unwrap();
    let again = handle.read(128, Charset::utf8()).unwrap();
    assert_eq!(again.chars().count(), 128);
    assert!(again.ends_with('é'));
}

#[test]
fn unget_is_fifo_by_push_front() {
    let (mut handle, _) = mem_handle();

    handle.ungetc('a' as i32).unwrap();
    handle.ungetc('b' as i32).unwrap();
    assert_eq!(handle.read(2, Charset::utf8()).unwrap(), "ba");
}

#[test]
fn unget_edge_cases() {
    let (mut handle, _) = mem_handle();

    // -1 is a no-op.
    handle.ungetc(-1).unwrap();
    assert_eq!(handle.read(1, Charset::utf8()).unwrap(), "");

    // Surrogates are not scalar values.
    assert!(matches!(
        handle.ungetc(0xD800),
        Err(IoError::InvalidCodepoint(0xD800))
    ));
}

#[test]
fn unget_cleared_by_seek() {
    let file = ScalarFile::from_bytes(b"xy".to_vec());
    let mut handle = LayeredHandle::new(Box::new(file));

    handle.ungetc('q' as i32).unwrap();
    handle.seek(0, Whence::Set).unwrap();
    assert_eq!(handle.read(2, Charset::utf8()).unwrap(), "xy");
}

#[test]
fn layered_read_respects_byte_safety_cap() {
    // A large backing buffer, a tiny request: the loop must not slurp more
    // than READ_BYTE_FACTOR × max_chars bytes.
    let file = ScalarFile::from_bytes(vec![b'z'; 4096]);
    let mut handle = LayeredHandle::with_layers(Box::new(file), ":encoding(UTF-8)").unwrap();

    let out = handle.read(4, Charset::utf8()).unwrap();
    assert_eq!(out, "zzzz");
    // Position reflects bounded consumption, not the whole buffer.
    assert!(handle.tell() <= (4 * perl_vm::consts::READ_BYTE_FACTOR) as i64);
}

#[test]
fn crlf_split_across_reads_through_the_facade() {
    // CR as the 128th byte, LF first in the next chunk.
    let mut bytes = vec![b'x'; 127];
    bytes.push(b'\r');
    bytes.push(b'\n');
    bytes.push(b'y');

    let file = ScalarFile::from_bytes(bytes);
    let mut handle = LayeredHandle::with_layers(Box::new(file), ":crlf").unwrap();

    let out = handle.read(129, Charset::utf8()).unwrap();
    assert_eq!(&out[..127], "x".repeat(127));
    assert_eq!(&out[127..], "\ny");
}
