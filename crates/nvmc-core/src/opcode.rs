//! VM opcode and stack-item type model (C1).
//!
//! A closed enumeration of every opcode this crate emits, its byte
//! encoding, and its operand layout classification. Byte values follow the
//! Neo N3 instruction set exactly so the emitted blob is executable by an
//! unmodified reference VM.

/// How an opcode's trailing operand bytes (if any) are laid out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandLayout {
    /// No operand bytes.
    Zero,
    /// A single operand byte.
    Byte,
    /// A little-endian 16-bit operand.
    Word,
    /// A little-endian 32-bit operand.
    Dword,
    /// A length-prefixed variable-length operand (`PUSHDATA1/2/4`).
    VarLenPrefixed,
    /// An 8-byte fixed-width immediate (`PUSHINT64`).
    Fixed8,
    /// A 16-byte fixed-width immediate (`PUSHINT128`).
    Fixed16,
    /// A 32-byte fixed-width immediate (`PUSHINT256`).
    Fixed32,
    /// A signed 8-bit relative jump delta.
    ShortJump,
    /// A signed 32-bit relative jump delta.
    LongJump,
    /// Two signed 32-bit relative deltas (catch, finally).
    TryRegionLong,
    /// Two signed 8-bit relative deltas (catch, finally).
    TryRegionShort,
}

macro_rules! opcodes {
    ($($variant:ident = $byte:expr, $layout:ident;)*) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, serde::Serialize, serde::Deserialize)]
        #[strum(serialize_all = "UPPERCASE")]
        pub enum Opcode {
            $($variant,)*
        }

        impl Opcode {
            pub fn to_byte(self) -> u8 {
                match self {
                    $(Self::$variant => $byte,)*
                }
            }

            pub fn from_byte(byte: u8) -> Option<Self> {
                match byte {
                    $($byte => Some(Self::$variant),)*
                    _ => None,
                }
            }

            pub fn operand_layout(self) -> OperandLayout {
                match self {
                    $(Self::$variant => OperandLayout::$layout,)*
                }
            }
        }
    };
}

opcodes! {
    // Constants
    PUSHINT8 = 0x00, Byte;
    PUSHINT16 = 0x01, Word;
    PUSHINT32 = 0x02, Dword;
    PUSHINT64 = 0x03, Fixed8;
    PUSHINT128 = 0x04, Fixed16;
    PUSHINT256 = 0x05, Fixed32;
    PUSHA = 0x0A, LongJump;
    PUSHNULL = 0x0B, Zero;
    PUSHDATA1 = 0x0C, VarLenPrefixed;
    PUSHDATA2 = 0x0D, VarLenPrefixed;
    PUSHDATA4 = 0x0E, VarLenPrefixed;
    PUSHM1 = 0x0F, Zero;
    PUSH0 = 0x10, Zero;
    PUSH1 = 0x11, Zero;
    PUSH2 = 0x12, Zero;
    PUSH3 = 0x13, Zero;
    PUSH4 = 0x14, Zero;
    PUSH5 = 0x15, Zero;
    PUSH6 = 0x16, Zero;
    PUSH7 = 0x17, Zero;
    PUSH8 = 0x18, Zero;
    PUSH9 = 0x19, Zero;
    PUSH10 = 0x1A, Zero;
    PUSH11 = 0x1B, Zero;
    PUSH12 = 0x1C, Zero;
    PUSH13 = 0x1D, Zero;
    PUSH14 = 0x1E, Zero;
    PUSH15 = 0x1F, Zero;
    PUSH16 = 0x20, Zero;

    // Flow control
    NOP = 0x21, Zero;
    JMP = 0x22, ShortJump;
    JMP_L = 0x23, LongJump;
    JMPIF = 0x24, ShortJump;
    JMPIF_L = 0x25, LongJump;
    JMPIFNOT = 0x26, ShortJump;
    JMPIFNOT_L = 0x27, LongJump;
    JMPEQ = 0x28, ShortJump;
    JMPEQ_L = 0x29, LongJump;
    JMPNE = 0x2A, ShortJump;
    JMPNE_L = 0x2B, LongJump;
    JMPGT = 0x2C, ShortJump;
    JMPGT_L = 0x2D, LongJump;
    JMPGE = 0x2E, ShortJump;
    JMPGE_L = 0x2F, LongJump;
    JMPLT = 0x30, ShortJump;
    JMPLT_L = 0x31, LongJump;
    JMPLE = 0x32, ShortJump;
    JMPLE_L = 0x33, LongJump;
    CALL = 0x34, ShortJump;
    CALL_L = 0x35, LongJump;
    CALLA = 0x36, Zero;
    CALLT = 0x37, Word;
    ABORT = 0x38, Zero;
    ASSERT = 0x39, Zero;
    THROW = 0x3A, Zero;
    TRY = 0x3B, TryRegionShort;
    TRY_L = 0x3C, TryRegionLong;
    ENDTRY = 0x3D, ShortJump;
    ENDTRY_L = 0x3E, LongJump;
    ENDFINALLY = 0x3F, Zero;
    RET = 0x40, Zero;
    SYSCALL = 0x41, Dword;

    // Stack
    DEPTH = 0x43, Zero;
    DROP = 0x45, Zero;
    NIP = 0x46, Zero;
    XDROP = 0x48, Zero;
    CLEAR = 0x49, Zero;
    DUP = 0x4A, Zero;
    OVER = 0x4B, Zero;
    PICK = 0x4D, Zero;
    TUCK = 0x4E, Zero;
    SWAP = 0x50, Zero;
    ROT = 0x51, Zero;
    ROLL = 0x52, Zero;
    REVERSE3 = 0x53, Zero;
    REVERSE4 = 0x54, Zero;
    REVERSEN = 0x55, Zero;

    // Slots
    INITSSLOT = 0x56, Byte;
    INITSLOT = 0x57, Word;
    LDSFLD0 = 0x58, Zero;
    LDSFLD = 0x60, Byte;
    STSFLD0 = 0x61, Zero;
    STSFLD = 0x69, Byte;
    LDLOC0 = 0x6A, Zero;
    LDLOC = 0x72, Byte;
    STLOC0 = 0x73, Zero;
    STLOC = 0x7B, Byte;
    LDARG0 = 0x7C, Zero;
    LDARG = 0x84, Byte;
    STARG0 = 0x85, Zero;
    STARG = 0x8D, Byte;

    // Splice
    NEWBUFFER = 0x88, Zero;
    MEMCPY = 0x89, Zero;
    CAT = 0x8B, Zero;

    // Bitwise/logic
    INVERT = 0x90, Zero;
    AND = 0x91, Zero;
    OR = 0x92, Zero;
    XOR = 0x93, Zero;
    EQUAL = 0x97, Zero;
    NOTEQUAL = 0x98, Zero;

    // Arithmetic
    SIGN = 0x99, Zero;
    ABS = 0x9A, Zero;
    NEGATE = 0x9B, Zero;
    INC = 0x9C, Zero;
    DEC = 0x9D, Zero;
    ADD = 0x9E, Zero;
    SUB = 0x9F, Zero;
    MUL = 0xA0, Zero;
    DIV = 0xA1, Zero;
    MOD = 0xA2, Zero;
    SHL = 0xA8, Zero;
    SHR = 0xA9, Zero;
    NOT = 0xAA, Zero;
    BOOLAND = 0xAB, Zero;
    BOOLOR = 0xAC, Zero;
    NUMEQUAL = 0xB3, Zero;
    NUMNOTEQUAL = 0xB4, Zero;
    LT = 0xB5, Zero;
    LE = 0xB6, Zero;
    GT = 0xB7, Zero;
    GE = 0xB8, Zero;
    MIN = 0xB9, Zero;
    MAX = 0xBA, Zero;

    // Compound types
    PACKMAP = 0xBE, Zero;
    PACKSTRUCT = 0xBF, Zero;
    PACK = 0xC0, Zero;
    UNPACK = 0xC1, Zero;
    NEWARRAY0 = 0xC2, Zero;
    NEWARRAY = 0xC3, Zero;
    NEWARRAY_T = 0xC4, Byte;
    NEWSTRUCT0 = 0xC5, Zero;
    NEWSTRUCT = 0xC6, Zero;
    NEWMAP = 0xC8, Zero;
    SIZE = 0xCA, Zero;
    HASKEY = 0xCB, Zero;
    KEYS = 0xCC, Zero;
    VALUES = 0xCD, Zero;
    PICKITEM = 0xCE, Zero;
    APPEND = 0xCF, Zero;
    SETITEM = 0xD0, Zero;
    REVERSEITEMS = 0xD1, Zero;
    REMOVE = 0xD2, Zero;
    CLEARITEMS = 0xD3, Zero;

    // Types
    ISNULL = 0xD8, Zero;
    ISTYPE = 0xD9, Byte;
    CONVERT = 0xDB, Byte;

    // Extensions
    ABORTMSG = 0xE0, Zero;
    ASSERTMSG = 0xE1, Zero;
}

/// Stack-item type tags, per the VM's runtime value model. Byte values
/// follow the reference VM's `StackItemType` encoding, consumed as the
/// `ISTYPE`/`CONVERT` operand byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, serde::Serialize, serde::Deserialize)]
pub enum StackItemType {
    Any,
    Pointer,
    Boolean,
    Integer,
    ByteArray,
    Buffer,
    Array,
    Struct,
    Map,
    InteropInterface,
    Null,
}

impl StackItemType {
    pub fn to_byte(self) -> u8 {
        match self {
            Self::Any => 0x00,
            Self::Pointer => 0x10,
            Self::Boolean => 0x20,
            Self::Integer => 0x21,
            Self::ByteArray => 0x28,
            Self::Buffer => 0x30,
            Self::Array => 0x40,
            Self::Struct => 0x41,
            Self::Map => 0x48,
            Self::InteropInterface => 0x60,
            Self::Null => 0x00,
        }
    }
}

/// Returns the long-form opcode for a short-form jump/call/try opcode, if
/// one exists. Used by the emitter (C2), which always emits long form, and
/// by the resolver (C9), which may compress back down.
pub fn long_form(op: Opcode) -> Option<Opcode> {
    use Opcode::*;
    Some(match op {
        JMP => JMP_L,
        JMPIF => JMPIF_L,
        JMPIFNOT => JMPIFNOT_L,
        JMPEQ => JMPEQ_L,
        JMPNE => JMPNE_L,
        JMPGT => JMPGT_L,
        JMPGE => JMPGE_L,
        JMPLT => JMPLT_L,
        JMPLE => JMPLE_L,
        CALL => CALL_L,
        ENDTRY => ENDTRY_L,
        TRY => TRY_L,
        _ => return None,
    })
}

/// Returns the short-form opcode for a long-form jump/call/try opcode, if
/// compression is ever legal for it. `PUSHA` and `TRY_L` are deliberately
/// excluded per spec: `PUSHA` always carries a full pointer-sized delta and
/// `TRYL` is never compressed (its exception-table consumers assume the
/// long encoding).
pub fn short_form(op: Opcode) -> Option<Opcode> {
    use Opcode::*;
    Some(match op {
        JMP_L => JMP,
        JMPIF_L => JMPIF,
        JMPIFNOT_L => JMPIFNOT,
        JMPEQ_L => JMPEQ,
        JMPNE_L => JMPNE,
        JMPGT_L => JMPGT,
        JMPGE_L => JMPGE,
        JMPLT_L => JMPLT,
        JMPLE_L => JMPLE,
        CALL_L => CALL,
        ENDTRY_L => ENDTRY,
        _ => return None,
    })
}

pub fn is_jump(op: Opcode) -> bool {
    matches!(op.operand_layout(), OperandLayout::ShortJump | OperandLayout::LongJump)
}

/// Full length in bytes of an instruction (opcode byte + operand), for a
/// fixed-width layout. Variable-length operand opcodes are not handled
/// here; callers compute their length from the encoded length prefix.
pub fn fixed_operand_len(layout: OperandLayout) -> Option<usize> {
    use OperandLayout::*;
    Some(match layout {
        Zero => 0,
        Byte => 1,
        Word => 2,
        Dword => 4,
        ShortJump => 1,
        LongJump => 4,
        TryRegionShort => 2,
        TryRegionLong => 8,
        Fixed8 => 8,
        Fixed16 => 16,
        Fixed32 => 32,
        VarLenPrefixed => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byte_roundtrip() {
        for op in [Opcode::RET, Opcode::JMP_L, Opcode::SYSCALL, Opcode::PACKSTRUCT] {
            assert_eq!(Opcode::from_byte(op.to_byte()), Some(op));
        }
    }

    #[test]
    fn short_long_pairs_invert() {
        assert_eq!(long_form(Opcode::JMP), Some(Opcode::JMP_L));
        assert_eq!(short_form(Opcode::JMP_L), Some(Opcode::JMP));
        assert_eq!(short_form(Opcode::PUSHA), None);
        assert_eq!(short_form(Opcode::TRY_L), None);
    }
}
