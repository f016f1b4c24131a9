//! URI interning table backing the LV2 `urid:map` / `urid:unmap` features.
//!
//! Plugins may cache any id they were handed, so the table is append-only:
//! an id, once assigned, names the same URI until the process exits.

use crate::uris::WELL_KNOWN;
use crate::{HostError, Result};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::ffi::{c_char, CString};

/// Interned URI. `0` is never assigned.
pub type Urid = u32;

#[derive(Default)]
struct Table {
    by_uri: HashMap<String, Urid>,
    // Index `i` holds the URI of id `i + 1`. `CString` keeps its heap
    // allocation when the vector grows, so pointers handed to `unmap`
    // callers stay valid.
    by_id: Vec<CString>,
}

/// Bidirectional, append-only URI ↔ id table.
pub struct UridMap {
    table: RwLock<Table>,
}

impl Default for UridMap {
    fn default() -> Self {
        Self::new()
    }
}

impl UridMap {
    /// New table with the well-known vocabulary interned first.
    pub fn new() -> Self {
        let map = Self {
            table: RwLock::new(Table::default()),
        };
        for uri in WELL_KNOWN {
            map.intern(uri);
        }
        map
    }

    /// Returns the existing id for `uri`, or assigns the next one.
    pub fn intern(&self, uri: &str) -> Urid {
        if let Some(&id) = self.table.read().by_uri.get(uri) {
            return id;
        }

        let mut table = self.table.write();
        if let Some(&id) = table.by_uri.get(uri) {
            return id;
        }

        // URIs never contain NUL; one that does cannot be unmapped by C code
        // either, so it is stored truncated at the first NUL.
        let c_uri = match CString::new(uri) {
            Ok(c) => c,
            Err(e) => {
                let end = e.nul_position();
                CString::new(&uri.as_bytes()[..end]).unwrap_or_default()
            }
        };
        table.by_id.push(c_uri);
        let id = table.by_id.len() as Urid;
        table.by_uri.insert(uri.to_string(), id);
        id
    }

    /// Inverse of [`intern`](Self::intern). Fails for `0` and unassigned ids.
    pub fn resolve(&self, id: Urid) -> Result<String> {
        let table = self.table.read();
        match id.checked_sub(1).and_then(|i| table.by_id.get(i as usize)) {
            Some(uri) => Ok(uri.to_string_lossy().into_owned()),
            None => Err(HostError::UnknownUrid(id)),
        }
    }

    /// Id of `uri` if it has been interned, without assigning one.
    pub fn lookup(&self, uri: &str) -> Option<Urid> {
        self.table.read().by_uri.get(uri).copied()
    }

    pub fn len(&self) -> usize {
        self.table.read().by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// NUL-terminated URI for `id`, or null.
    ///
    /// The pointer stays valid for as long as this map lives.
    #[cfg_attr(not(feature = "lilv"), allow(dead_code))]
    pub(crate) fn resolve_ptr(&self, id: Urid) -> *const c_char {
        let table = self.table.read();
        match id.checked_sub(1).and_then(|i| table.by_id.get(i as usize)) {
            Some(uri) => uri.as_ptr(),
            None => std::ptr::null(),
        }
    }
}
