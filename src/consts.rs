//! VM parameters

/// Maximum number of `i32` slots a single subroutine may occupy in the
/// bytecode stream. The compiler splits larger subroutines at top-level
/// statement boundaries into helpers chained by tail call.
pub const MAX_SUB_OPCODES: usize = 8192;

/// Maximum native call depth for non-tail calls. Tail calls run on the
/// trampoline and consume no native stack.
pub const MAX_CALL_DEPTH: usize = 2048;

/// Byte granularity of backing-handle requests inside the layered read loop.
pub const READ_CHUNK: usize = 128;

/// Upper bound on bytes consumed by one layered read, as a multiple of the
/// requested character count.
pub const READ_BYTE_FACTOR: usize = 4;

/// Integers in `0..=SMALL_INT_STRINGS` share interned string forms.
pub const SMALL_INT_STRINGS: i64 = 256;

/// Sanity bound on the register count a program may declare.
pub const MAX_REGISTERS: usize = 1 << 16;
