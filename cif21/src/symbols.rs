//!
//! # Symbol Table & Cell Graph
//!
//! Symbols live in a slot-map arena and are addressed by stable
//! [SymbolKey] handles; instance records ([Cref]s) hold handles, not
//! references, so forward and even cyclic reference chains are
//! representable without ownership knots. The table is bidirectional -
//! number and name both index into the same arena - and a reference by
//! number alone creates a placeholder that is later *promoted* in place
//! when its name arrives, never duplicated.
//!

// Std-Lib
use std::collections::HashMap;

// Crates.io
use serde::{Deserialize, Serialize};
use slotmap::{new_key_type, SlotMap};

// Local imports
use crate::data::CifMode;
use crate::error::{CifError, CifResult, CifWarning};
use crate::geom::{BoundBox, Point};
use crate::xform::TicketId;
use crate::Int;

new_key_type! {
    /// Keys for [Symbol] entries
    pub struct SymbolKey;
}

/// # Rectangular Array Specification
///
/// Counts and pitches for an arrayed instance.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ArraySpec {
    /// Column count
    pub nx: Int,
    /// Row count
    pub ny: Int,
    /// Column pitch
    pub px: Int,
    /// Row pitch
    pub py: Int,
}

/// # Instance-Use Record
///
/// One placement of a target symbol inside its owning symbol.
/// Belongs to exactly one owner; ordered in file order within it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cref {
    /// Target symbol handle, possibly a placeholder resolved later
    pub target: SymbolKey,
    /// Interned placement ticket
    pub ticket: TicketId,
    /// Placement position, in scaled units
    pub pos: Point,
    /// Optional rectangular array
    pub array: Option<ArraySpec>,
    /// List-end marker, maintained by [SymbolTable::append_cref]
    pub is_last: bool,
}

/// # Symbol Entry
///
/// One hierarchical cell definition, or a placeholder awaiting one.
#[derive(Debug, Clone)]
pub struct Symbol {
    /// Interned name; `None` until a name record is seen
    pub name: Option<String>,
    /// Numeric id; `None` for symbols created by name before any number
    pub number: Option<u32>,
    /// Owning mode
    pub mode: CifMode,
    /// Whether a definition body has been scanned (false = referenced-only placeholder)
    pub defined: bool,
    /// File byte offset of the definition record, zero until observed
    pub offset: u64,
    /// Cached bounding box, filled by the post-pass
    pub bbox: Option<BoundBox>,
    /// Ordered instance references contained in our definition
    pub crefs: Vec<Cref>,
    /// Set when an in-memory override stands in for our definition
    pub should_skip: bool,
    /// Pass counter stamped at definition, for re-entrancy checks
    defined_pass: u32,
}
impl Symbol {
    fn placeholder(mode: CifMode) -> Self {
        Self {
            name: None,
            number: None,
            mode,
            defined: false,
            offset: 0,
            bbox: None,
            crefs: Vec::new(),
            should_skip: false,
            defined_pass: 0,
        }
    }
    /// The display name: the bound name, or the synthesized placeholder form
    pub fn display_name(&self) -> String {
        match (&self.name, self.number) {
            (Some(name), _) => name.clone(),
            (None, Some(num)) => format!("Symbol{}", num),
            (None, None) => "Symbol?".to_string(),
        }
    }
}

/// # Symbol Table
///
/// The per-mode arena plus its number and name indexes. One table is
/// exclusively owned by one read/translate operation, and is reused
/// across that operation's passes (discovery, then materialization or
/// translation) via [SymbolTable::begin_pass].
#[derive(Debug, Clone)]
pub struct SymbolTable {
    mode: CifMode,
    slots: SlotMap<SymbolKey, Symbol>,
    by_number: HashMap<u32, SymbolKey>,
    by_name: HashMap<String, SymbolKey>,
    /// Currently-open definition, if any
    open: Option<SymbolKey>,
    /// Current pass number
    pass: u32,
}
impl SymbolTable {
    /// Create a new, empty table for `mode`
    pub fn new(mode: CifMode) -> Self {
        Self {
            mode,
            slots: SlotMap::with_key(),
            by_number: HashMap::new(),
            by_name: HashMap::new(),
            open: None,
            pass: 1,
        }
    }
    /// Our owning mode
    pub fn mode(&self) -> CifMode {
        self.mode
    }
    /// Begin a new pass over the same file: re-definitions become legal
    /// again, and any dangling open symbol is discarded.
    pub fn begin_pass(&mut self) {
        self.pass += 1;
        self.open = None;
        for (_, sym) in self.slots.iter_mut() {
            sym.crefs.clear();
        }
    }
    /// Look up a symbol by name
    pub fn find_name(&self, name: &str) -> Option<SymbolKey> {
        self.by_name.get(name).copied()
    }
    /// Look up a symbol by number
    pub fn find_number(&self, number: u32) -> Option<SymbolKey> {
        self.by_number.get(&number).copied()
    }
    /// Get a reference to the symbol at `key`
    pub fn get(&self, key: SymbolKey) -> Option<&Symbol> {
        self.slots.get(key)
    }
    /// Get a mutable reference to the symbol at `key`
    pub fn get_mut(&mut self, key: SymbolKey) -> Option<&mut Symbol> {
        self.slots.get_mut(key)
    }
    /// Iterate over all (key, symbol) entries
    pub fn iter(&self) -> impl Iterator<Item = (SymbolKey, &Symbol)> {
        self.slots.iter()
    }
    /// Number of symbols in the arena
    pub fn len(&self) -> usize {
        self.slots.len()
    }
    /// Boolean indication of an empty arena
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
    /// The currently-open definition, if any
    pub fn open_symbol(&self) -> Option<SymbolKey> {
        self.open
    }
    /// Find or create the symbol identified by `name` and/or `number`.
    ///
    /// A number-only mention creates a nameless placeholder; a later
    /// mention carrying both promotes that same entry in place. Two
    /// pre-existing *distinct* entries claiming the same identity is a
    /// structural conflict - promotion never merges arenas.
    pub fn get_or_create(
        &mut self,
        name: Option<&str>,
        number: Option<u32>,
    ) -> CifResult<SymbolKey> {
        let by_name = name.and_then(|n| self.find_name(n));
        let by_number = number.and_then(|n| self.find_number(n));
        let key = match (by_name, by_number) {
            (Some(a), Some(b)) if a != b => {
                return Err(CifError::Structural {
                    msg: format!(
                        "symbol name `{}` and number {} identify different entries",
                        name.unwrap_or_default(),
                        number.unwrap_or_default()
                    ),
                });
            }
            (Some(key), _) | (None, Some(key)) => key,
            (None, None) => {
                let key = self.slots.insert(Symbol::placeholder(self.mode));
                key
            }
        };
        // Promote in place: bind whichever halves of the identity are new
        if let Some(num) = number {
            let sym = self.slots.get_mut(key).unwrap_or_else(|| unreachable!());
            match sym.number {
                Some(existing) if existing != num => {
                    return Err(CifError::Structural {
                        msg: format!(
                            "symbol `{}` already numbered {}, re-numbered {}",
                            sym.display_name(),
                            existing,
                            num
                        ),
                    });
                }
                Some(_) => (),
                None => {
                    sym.number = Some(num);
                    self.by_number.insert(num, key);
                }
            }
        }
        if let Some(name) = name {
            self.bind_name(key, name)?;
        }
        Ok(key)
    }
    /// Bind `name` to the symbol at `key`, promoting a nameless placeholder.
    pub fn bind_name(&mut self, key: SymbolKey, name: &str) -> CifResult<()> {
        if let Some(existing) = self.find_name(name) {
            if existing != key {
                return Err(CifError::Structural {
                    msg: format!("symbol name `{}` already bound to another entry", name),
                });
            }
            return Ok(());
        }
        let sym = match self.slots.get_mut(key) {
            Some(sym) => sym,
            None => {
                return Err(CifError::Structural {
                    msg: "name bound to a dangling symbol handle".to_string(),
                })
            }
        };
        if let Some(old) = sym.name.take() {
            self.by_name.remove(&old);
        }
        sym.name = Some(name.to_string());
        self.by_name.insert(name.to_string(), key);
        Ok(())
    }
    /// Mark the symbol at `key` defined at byte `offset`, and open it.
    /// Re-entrant redefinition within the same pass is a structural error;
    /// a later pass over the same file may re-define freely.
    pub fn mark_defined(&mut self, key: SymbolKey, offset: u64) -> CifResult<()> {
        if self.open.is_some() {
            return Err(CifError::Structural {
                msg: "nested symbol definition: DS before the previous DF".to_string(),
            });
        }
        let pass = self.pass;
        let sym = match self.slots.get_mut(key) {
            Some(sym) => sym,
            None => {
                return Err(CifError::Structural {
                    msg: "definition of a dangling symbol handle".to_string(),
                })
            }
        };
        if sym.defined && sym.defined_pass == pass {
            return Err(CifError::Structural {
                msg: format!(
                    "re-entrant redefinition of symbol `{}` in one pass",
                    sym.display_name()
                ),
            });
        }
        sym.defined = true;
        sym.defined_pass = pass;
        sym.offset = offset;
        sym.crefs.clear();
        self.open = Some(key);
        Ok(())
    }
    /// Close the currently-open definition
    pub fn close_definition(&mut self) -> CifResult<SymbolKey> {
        match self.open.take() {
            Some(key) => Ok(key),
            None => Err(CifError::Structural {
                msg: "DF without a matching DS".to_string(),
            }),
        }
    }
    /// Append an instance reference to `owner`'s cref list.
    ///
    /// Appends are legal only while `owner` is the open definition, and
    /// only at the tail: the previous tail's `is_last` is cleared and the
    /// new record takes it. This ordering is what the digest layer's
    /// incremental cache validates against.
    pub fn append_cref(
        &mut self,
        owner: SymbolKey,
        target: SymbolKey,
        ticket: TicketId,
        pos: Point,
        array: Option<ArraySpec>,
    ) -> CifResult<usize> {
        if self.open != Some(owner) {
            return Err(CifError::Structural {
                msg: "instance append to a symbol that is not open".to_string(),
            });
        }
        let sym = match self.slots.get_mut(owner) {
            Some(sym) => sym,
            None => {
                return Err(CifError::Structural {
                    msg: "instance append to a dangling symbol handle".to_string(),
                })
            }
        };
        if let Some(last) = sym.crefs.last_mut() {
            if !last.is_last {
                return Err(CifError::Structural {
                    msg: format!(
                        "out-of-order instance append in `{}`",
                        sym.display_name()
                    ),
                });
            }
            last.is_last = false;
        }
        sym.crefs.push(Cref {
            target,
            ticket,
            pos,
            array,
            is_last: true,
        });
        Ok(sym.crefs.len() - 1)
    }
    /// Validate the cref tail invariant for `key`: exactly the final
    /// record carries `is_last`. The digest layer runs this before
    /// trusting a cached list.
    pub fn verify_cref_tail(&self, key: SymbolKey) -> CifResult<()> {
        let sym = match self.slots.get(key) {
            Some(sym) => sym,
            None => {
                return Err(CifError::Structural {
                    msg: "cref verification of a dangling handle".to_string(),
                })
            }
        };
        for (k, cref) in sym.crefs.iter().enumerate() {
            let should_be_last = k == sym.crefs.len() - 1;
            if cref.is_last != should_be_last {
                return Err(CifError::Structural {
                    msg: format!(
                        "cref list of `{}` violates the tail invariant at index {}",
                        sym.display_name(),
                        k
                    ),
                });
            }
        }
        Ok(())
    }
    /// End-of-file resolution: bind a synthesized `Symbol<N>` name to each
    /// referenced-but-never-named number. Format-tolerant: a warning per
    /// placeholder, never an error.
    pub fn resolve_placeholders(&mut self) -> Vec<CifWarning> {
        let mut warnings = Vec::new();
        let unnamed: Vec<(SymbolKey, u32)> = self
            .slots
            .iter()
            .filter_map(|(key, sym)| match (&sym.name, sym.number) {
                (None, Some(num)) => Some((key, num)),
                _ => None,
            })
            .collect();
        for (key, num) in unnamed {
            let synthesized = format!("Symbol{}", num);
            // A collision with a real name of this form is vanishingly
            // unlikely but possible; fall back to key-uniqued names.
            let name = if self.by_name.contains_key(&synthesized) {
                format!("Symbol{}_{:?}", num, key)
            } else {
                synthesized
            };
            if self.bind_name(key, &name).is_ok() {
                let defined = self.slots[key].defined;
                if !defined {
                    warnings.push(CifWarning::UnresolvedReference {
                        number: num,
                        mode: self.mode,
                    });
                }
            }
        }
        warnings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xform::CifPlacement;

    #[test]
    fn forward_reference_promotes_in_place() {
        // Reference number 5 before it is named: exactly one entry results.
        let mut table = SymbolTable::new(CifMode::Phys);
        let by_num = table.get_or_create(None, Some(5)).unwrap();
        assert!(table.get(by_num).unwrap().name.is_none());
        let promoted = table.get_or_create(Some("nand2"), Some(5)).unwrap();
        assert_eq!(by_num, promoted);
        assert_eq!(table.len(), 1);
        assert_eq!(table.find_name("nand2"), Some(by_num));
        assert_eq!(table.find_number(5), Some(by_num));
    }
    #[test]
    fn redefinition_in_one_pass_rejected() {
        let mut table = SymbolTable::new(CifMode::Phys);
        let key = table.get_or_create(None, Some(1)).unwrap();
        table.mark_defined(key, 10).unwrap();
        table.close_definition().unwrap();
        assert!(table.mark_defined(key, 99).is_err());
        // A fresh pass may re-define
        table.begin_pass();
        assert!(table.mark_defined(key, 10).is_ok());
    }
    #[test]
    fn cref_ordering() {
        let mut table = SymbolTable::new(CifMode::Phys);
        let owner = table.get_or_create(None, Some(1)).unwrap();
        let target = table.get_or_create(None, Some(2)).unwrap();
        table.mark_defined(owner, 4).unwrap();
        let mut tickets = crate::xform::TicketTable::new();
        let t = tickets.intern(&CifPlacement::at(Point::new(10, 10)));
        table
            .append_cref(owner, target, t, Point::new(10, 10), None)
            .unwrap();
        table
            .append_cref(owner, target, t, Point::new(20, 10), None)
            .unwrap();
        let sym = table.get(owner).unwrap();
        assert_eq!(sym.crefs.len(), 2);
        assert!(!sym.crefs[0].is_last);
        assert!(sym.crefs[1].is_last);
        table.verify_cref_tail(owner).unwrap();
        // Appends after close are rejected
        table.close_definition().unwrap();
        assert!(table
            .append_cref(owner, target, t, Point::new(30, 10), None)
            .is_err());
    }
    #[test]
    fn placeholder_resolution_synthesizes_names() {
        let mut table = SymbolTable::new(CifMode::Phys);
        table.get_or_create(None, Some(42)).unwrap();
        let warnings = table.resolve_placeholders();
        assert_eq!(warnings.len(), 1);
        assert!(table.find_name("Symbol42").is_some());
    }
}
