//! The DBM's single-threaded fetch-dispatch-execute loop (spec.md §4.4,
//! §4.5): one handler per opcode, a flat register file, and an auto-growing
//! cursor array, all driven off a `Vec<Instruction>` program.

use std::cmp::Ordering;

use crate::btree::cell::Cell;
use crate::btree::cursor::Cursor;
use crate::btree::ops::{btree_find, btree_insert};
use crate::btree::NodeType;
use crate::dbm::opcode::{Instruction, Opcode, P4};
use crate::dbm::register::{Register, RegisterFile};
use crate::error::{Error, Result};
use crate::pager::{PageNum, Pager};
use crate::record;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CursorMode {
    Read,
    Write,
}

struct CursorSlot {
    cursor: Cursor,
    #[allow(dead_code)] // carried for parity with the opcode's documented operand; not yet load-bearing.
    mode: CursorMode,
    #[allow(dead_code)]
    n_columns: i32,
}

/// Free function rather than a `&mut self` method: borrows only the
/// `cursors` field, leaving `pager` free for the same statement to use
/// (traversal opcodes need both at once).
fn cursor_of(cursors: &mut [Option<CursorSlot>], id: usize) -> Result<&mut Cursor> {
    cursors
        .get_mut(id)
        .and_then(|s| s.as_mut())
        .map(|s| &mut s.cursor)
        .ok_or(Error::ECellNo)
}

/// Executes one DBM program against a pager, collecting emitted rows.
pub struct Machine<'a> {
    pager: &'a mut Pager,
    program: Vec<Instruction>,
    pc: usize,
    registers: RegisterFile,
    cursors: Vec<Option<CursorSlot>>,
    result_rows: Vec<Vec<Register>>,
    halted: bool,
    exit_code: i32,
}

impl<'a> Machine<'a> {
    pub fn new(pager: &'a mut Pager, program: Vec<Instruction>) -> Self {
        Machine {
            pager,
            program,
            pc: 0,
            registers: RegisterFile::new(),
            cursors: Vec::new(),
            result_rows: Vec::new(),
            halted: false,
            exit_code: 0,
        }
    }

    fn cursor_slot(&self, id: usize) -> Result<&CursorSlot> {
        self.cursors
            .get(id)
            .and_then(|s| s.as_ref())
            .ok_or(Error::ECellNo)
    }

    fn root_of(&self, id: usize) -> Result<PageNum> {
        Ok(self.cursor_slot(id)?.cursor.root())
    }

    fn set_cursor(&mut self, id: usize, mode: CursorMode, root: PageNum, n_columns: i32) {
        if self.cursors.len() <= id {
            self.cursors.resize_with(id + 1, || None);
        }
        self.cursors[id] = Some(CursorSlot {
            cursor: Cursor::new(root),
            mode,
            n_columns,
        });
    }

    fn int32(&self, r: i32) -> Result<i32> {
        match self.registers.get(r as usize) {
            Register::Int32(v) => Ok(*v),
            _ => Err(Error::ECorruptHeader),
        }
    }

    /// Runs the program to completion, returning the emitted rows and the
    /// `Halt` exit code.
    pub fn run(&mut self) -> Result<(Vec<Vec<Register>>, i32)> {
        while !self.halted {
            if self.pc >= self.program.len() {
                break;
            }
            self.step()?;
        }
        Ok((std::mem::take(&mut self.result_rows), self.exit_code))
    }

    fn step(&mut self) -> Result<()> {
        let insn = self.program[self.pc].clone();
        log::trace!("pc={} {:?}", self.pc, insn);
        let mut next_pc = self.pc + 1;
        match insn.opcode {
            Opcode::OpenRead | Opcode::OpenWrite => {
                let mode = if insn.opcode == Opcode::OpenRead {
                    CursorMode::Read
                } else {
                    CursorMode::Write
                };
                let root = self.int32(insn.p2)? as PageNum;
                self.set_cursor(insn.p1 as usize, mode, root, insn.p3);
            }
            Opcode::Close => {
                if let Some(slot) = self.cursors.get_mut(insn.p1 as usize) {
                    *slot = None;
                }
            }

            Opcode::Rewind => {
                let cursor = cursor_of(&mut self.cursors, insn.p1 as usize)?;
                cursor.rewind(self.pager)?;
                if cursor.is_empty_tree() {
                    next_pc = insn.p2 as usize;
                }
            }
            Opcode::Next => {
                let cursor = cursor_of(&mut self.cursors, insn.p1 as usize)?;
                if cursor.next(self.pager).is_ok() {
                    next_pc = insn.p2 as usize;
                }
            }
            Opcode::Prev => {
                let cursor = cursor_of(&mut self.cursors, insn.p1 as usize)?;
                if cursor.prev(self.pager).is_ok() {
                    next_pc = insn.p2 as usize;
                }
            }

            Opcode::Seek | Opcode::SeekGt | Opcode::SeekGe | Opcode::SeekLt | Opcode::SeekLe => {
                let key = self.int32(insn.p3)? as u32;
                let cursor = cursor_of(&mut self.cursors, insn.p1 as usize)?;
                let outcome = match insn.opcode {
                    Opcode::Seek => cursor.seek(self.pager, key),
                    Opcode::SeekGt => cursor.seek_gt(self.pager, key),
                    Opcode::SeekGe => cursor.seek_ge(self.pager, key),
                    Opcode::SeekLt => cursor.seek_lt(self.pager, key),
                    Opcode::SeekLe => cursor.seek_le(self.pager, key),
                    _ => unreachable!(),
                };
                if outcome.is_err() {
                    next_pc = insn.p2 as usize;
                }
            }

            Opcode::Integer => self.registers.set(insn.p2 as usize, Register::Int32(insn.p1)),
            Opcode::String => {
                let s = match &insn.p4 {
                    P4::Str(s) => s.clone(),
                    P4::None => String::new(),
                };
                self.registers.set(insn.p2 as usize, Register::String(s));
            }
            Opcode::Null => self.registers.set(insn.p2 as usize, Register::Null),
            Opcode::Copy | Opcode::SCopy => {
                let v = self.registers.get(insn.p1 as usize).clone();
                self.registers.set(insn.p2 as usize, v);
            }

            Opcode::Eq | Opcode::Ne | Opcode::Lt | Opcode::Le | Opcode::Gt | Opcode::Ge => {
                let a = self.registers.get(insn.p1 as usize).clone();
                let b = self.registers.get(insn.p3 as usize).clone();
                let ord = a.compare(&b);
                let truth = match insn.opcode {
                    Opcode::Eq => ord == Ordering::Equal,
                    Opcode::Ne => ord != Ordering::Equal,
                    Opcode::Lt => ord == Ordering::Less,
                    Opcode::Le => ord != Ordering::Greater,
                    Opcode::Gt => ord == Ordering::Greater,
                    Opcode::Ge => ord != Ordering::Less,
                    _ => unreachable!(),
                };
                if truth {
                    next_pc = insn.p2 as usize;
                }
            }

            Opcode::Column => {
                let cell = self.cursor_slot(insn.p1 as usize)?.cursor.current_cell()?;
                let payload = match cell {
                    Cell::TableLeaf { payload, .. } => payload,
                    _ => return Err(Error::ECorruptHeader),
                };
                let value = record::decode_column(&payload, insn.p2 as usize)?;
                self.registers.set(insn.p3 as usize, value);
            }
            Opcode::Key => {
                let key = self.cursor_slot(insn.p1 as usize)?.cursor.current_key()?;
                self.registers.set(insn.p2 as usize, Register::Int32(key as i32));
            }
            Opcode::ResultRow => {
                let row = self.registers.slice(insn.p1 as usize, insn.p2 as usize);
                self.result_rows.push(row);
            }
            Opcode::MakeRecord => {
                let values = self.registers.slice(insn.p1 as usize, insn.p2 as usize);
                let blob = record::encode_record(&values);
                self.registers.set(insn.p3 as usize, Register::Binary(blob));
            }

            Opcode::Insert => {
                let root = self.root_of(insn.p1 as usize)?;
                let key = self.int32(insn.p3)? as u32;
                let payload = match self.registers.get(insn.p2 as usize) {
                    Register::Binary(b) => b.clone(),
                    other => record::encode_record(std::slice::from_ref(other)),
                };
                btree_insert(self.pager, root, Cell::TableLeaf { key, payload })?;
            }

            Opcode::IdxGt | Opcode::IdxGe | Opcode::IdxLt | Opcode::IdxLe => {
                let key = self.int32(insn.p3)? as u32;
                let current = self.cursor_slot(insn.p1 as usize)?.cursor.current_key()?;
                let truth = match insn.opcode {
                    Opcode::IdxGt => current > key,
                    Opcode::IdxGe => current >= key,
                    Opcode::IdxLt => current < key,
                    Opcode::IdxLe => current <= key,
                    _ => unreachable!(),
                };
                if truth {
                    next_pc = insn.p2 as usize;
                }
            }
            Opcode::IdxPKey => {
                let cell = self.cursor_slot(insn.p1 as usize)?.cursor.current_cell()?;
                let pk = cell.key_pk().ok_or(Error::ECorruptHeader)?;
                self.registers.set(insn.p2 as usize, Register::Int32(pk as i32));
            }
            Opcode::IdxInsert => {
                let root = self.root_of(insn.p1 as usize)?;
                let idx_key = self.int32(insn.p2)? as u32;
                let pk = self.int32(insn.p3)? as u32;
                btree_insert(
                    self.pager,
                    root,
                    Cell::IndexLeaf { key: idx_key, key_pk: pk },
                )?;
            }

            Opcode::CreateTable => {
                let root = crate::btree::node::Node::new(self.pager, NodeType::TableLeaf)?.0;
                self.registers.set(insn.p1 as usize, Register::Int32(root as i32));
            }
            Opcode::CreateIndex => {
                let root = crate::btree::node::Node::new(self.pager, NodeType::IndexLeaf)?.0;
                self.registers.set(insn.p1 as usize, Register::Int32(root as i32));
            }

            Opcode::Halt => {
                self.halted = true;
                self.exit_code = insn.p1;
            }
        }
        self.pc = next_pc;
        Ok(())
    }
}

/// Looks a single row up by primary key without going through a program —
/// a convenience the CLI's `dump` command uses (spec.md §10.3).
pub fn find_row(pager: &mut Pager, root: PageNum, key: u32) -> Result<Vec<Register>> {
    let payload = btree_find(pager, root, key)?;
    record::decode_record(&payload)
}
