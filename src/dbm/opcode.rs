//! The flat `Instruction { opcode, p1, p2, p3, p4 }` shape the DBM program
//! interface exposes (spec.md §4.4, §6 "DBM program interface") — one
//! opcode enum plus uniform operand slots, rather than a struct per opcode.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    OpenRead,
    OpenWrite,
    Close,

    Rewind,
    Next,
    Prev,

    Seek,
    SeekGt,
    SeekGe,
    SeekLt,
    SeekLe,

    Integer,
    String,
    Null,
    Copy,
    SCopy,

    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,

    Column,
    Key,
    ResultRow,
    MakeRecord,

    Insert,

    IdxGt,
    IdxGe,
    IdxLt,
    IdxLe,
    IdxPKey,
    IdxInsert,

    CreateTable,
    CreateIndex,

    Halt,
}

/// The fourth operand, which carries a string or nothing rather than an
/// int32 (spec.md §6: "p4:string").
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum P4 {
    #[default]
    None,
    Str(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    pub opcode: Opcode,
    pub p1: i32,
    pub p2: i32,
    pub p3: i32,
    pub p4: P4,
}

impl Instruction {
    pub fn new(opcode: Opcode, p1: i32, p2: i32, p3: i32) -> Self {
        Instruction {
            opcode,
            p1,
            p2,
            p3,
            p4: P4::None,
        }
    }

    pub fn with_p4(opcode: Opcode, p1: i32, p2: i32, p3: i32, p4: &str) -> Self {
        Instruction {
            opcode,
            p1,
            p2,
            p3,
            p4: P4::Str(p4.to_string()),
        }
    }
}
