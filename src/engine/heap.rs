//! Engine working memory
//!
//! Terms live in a flat cell array addressed by [`TermRef`]. Construction
//! follows the engine's foreign-interface convention: a term starts as an
//! unbound variable and is then bound in place (`bind_list`, `bind_int`,
//! `bind_nil`, `bind_functor`), so lists grow one cell pair at a time from
//! the head.

use crate::errors::HeapError;
use smallvec::SmallVec;
use std::sync::Arc;

/// Index of a cell in working memory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TermRef(u32);

impl TermRef {
    #[inline]
    pub fn index(self) -> u32 {
        self.0
    }
}

/// One cell of working memory
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    /// Unbound variable
    Var,
    /// Variable bound to another term
    Ref(TermRef),
    Int(i64),
    Nil,
    Cons { head: TermRef, tail: TermRef },
    Struct {
        name: Arc<str>,
        args: SmallVec<[TermRef; 4]>,
    },
}

#[derive(Debug)]
pub struct Heap {
    cells: Vec<Cell>,
    limit: usize,
}

impl Heap {
    pub fn new(initial_cells: usize, limit: usize) -> Self {
        Self {
            cells: Vec::with_capacity(initial_cells.min(limit)),
            limit,
        }
    }

    /// Cells in use
    #[inline]
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    #[inline]
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Cells still available before the limit
    #[inline]
    pub fn available(&self) -> usize {
        self.limit - self.cells.len()
    }

    /// Ensure room for `additional` more cells, growing the backing store
    pub fn reserve(&mut self, additional: usize) -> Result<(), HeapError> {
        let requested = self.cells.len().saturating_add(additional);
        if requested > self.limit {
            return Err(HeapError::Overflow {
                requested,
                in_use: self.cells.len(),
                limit: self.limit,
            });
        }
        self.cells.reserve(additional);
        Ok(())
    }

    /// Discard every term
    pub fn clear(&mut self) {
        self.cells.clear();
    }

    fn push(&mut self, cell: Cell) -> Result<TermRef, HeapError> {
        if self.cells.len() >= self.limit {
            return Err(HeapError::Overflow {
                requested: self.cells.len() + 1,
                in_use: self.cells.len(),
                limit: self.limit,
            });
        }
        let index = self.cells.len() as u32;
        self.cells.push(cell);
        Ok(TermRef(index))
    }

    /// Allocate a fresh unbound variable
    pub fn new_var(&mut self) -> Result<TermRef, HeapError> {
        self.push(Cell::Var)
    }

    /// Follow variable bindings to the representative cell
    pub fn deref(&self, mut term: TermRef) -> Result<TermRef, HeapError> {
        loop {
            match self.cells.get(term.0 as usize) {
                Some(Cell::Ref(next)) => term = *next,
                Some(_) => return Ok(term),
                None => return Err(HeapError::Dangling(term.0)),
            }
        }
    }

    /// Cell behind `term` after dereferencing
    pub fn get(&self, term: TermRef) -> Result<&Cell, HeapError> {
        let term = self.deref(term)?;
        Ok(&self.cells[term.0 as usize])
    }

    pub fn is_unbound(&self, term: TermRef) -> Result<bool, HeapError> {
        Ok(matches!(self.get(term)?, Cell::Var))
    }

    pub fn is_nil(&self, term: TermRef) -> Result<bool, HeapError> {
        Ok(matches!(self.get(term)?, Cell::Nil))
    }

    pub fn int_value(&self, term: TermRef) -> Result<Option<i64>, HeapError> {
        match self.get(term)? {
            Cell::Int(v) => Ok(Some(*v)),
            _ => Ok(None),
        }
    }

    /// Argument `n` (1-based) of a structure
    pub fn arg(&self, term: TermRef, n: usize) -> Result<Option<TermRef>, HeapError> {
        match self.get(term)? {
            Cell::Struct { args, .. } => Ok(n.checked_sub(1).and_then(|i| args.get(i)).copied()),
            _ => Ok(None),
        }
    }

    pub fn functor(&self, term: TermRef) -> Result<Option<(Arc<str>, usize)>, HeapError> {
        match self.get(term)? {
            Cell::Struct { name, args } => Ok(Some((name.clone(), args.len()))),
            _ => Ok(None),
        }
    }

    fn bind(&mut self, term: TermRef, cell: Cell) -> Result<(), HeapError> {
        let target = self.deref(term)?;
        let slot = &mut self.cells[target.0 as usize];
        if !matches!(slot, Cell::Var) {
            return Err(HeapError::NotUnbound(target.0));
        }
        *slot = cell;
        Ok(())
    }

    pub fn bind_int(&mut self, term: TermRef, value: i64) -> Result<(), HeapError> {
        self.bind(term, Cell::Int(value))
    }

    pub fn bind_nil(&mut self, term: TermRef) -> Result<(), HeapError> {
        self.bind(term, Cell::Nil)
    }

    /// Bind `term` to a cons cell with fresh head and tail variables
    pub fn bind_list(&mut self, term: TermRef) -> Result<(TermRef, TermRef), HeapError> {
        // Check before allocating so a failed bind leaves no orphan cells
        self.deref(term).and_then(|t| match self.cells[t.0 as usize] {
            Cell::Var => Ok(()),
            _ => Err(HeapError::NotUnbound(t.0)),
        })?;
        let head = self.new_var()?;
        let tail = self.new_var()?;
        self.bind(term, Cell::Cons { head, tail })?;
        Ok((head, tail))
    }

    /// Bind `term` to `name/arity` with fresh variable arguments
    pub fn bind_functor(
        &mut self,
        term: TermRef,
        name: &str,
        arity: usize,
    ) -> Result<SmallVec<[TermRef; 4]>, HeapError> {
        if !self.is_unbound(term)? {
            return Err(HeapError::NotUnbound(self.deref(term)?.0));
        }
        let mut args = SmallVec::with_capacity(arity);
        for _ in 0..arity {
            args.push(self.new_var()?);
        }
        self.bind(
            term,
            Cell::Struct {
                name: Arc::from(name),
                args: args.clone(),
            },
        )?;
        Ok(args)
    }

    /// Unify an unbound variable with an existing term
    pub fn bind_term(&mut self, var: TermRef, value: TermRef) -> Result<(), HeapError> {
        let value = self.deref(value)?;
        if self.deref(var)? == value {
            return Ok(());
        }
        self.bind(var, Cell::Ref(value))
    }

    /// Walk a list head by head until the terminator
    pub fn list_iter(&self, list: TermRef) -> ListIter<'_> {
        ListIter {
            heap: self,
            next: Some(list),
            budget: self.cells.len(),
        }
    }
}

/// Sequential head/tail traversal of a list term
pub struct ListIter<'a> {
    heap: &'a Heap,
    next: Option<TermRef>,
    // A proper list never has more elements than the heap has cells
    budget: usize,
}

impl<'a> Iterator for ListIter<'a> {
    type Item = Result<TermRef, HeapError>;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next.take()?;
        match self.heap.deref(current) {
            Ok(cell_ref) => match &self.heap.cells[cell_ref.0 as usize] {
                Cell::Nil => None,
                Cell::Cons { .. } if self.budget == 0 => {
                    Some(Err(HeapError::Unterminated(cell_ref.0)))
                }
                Cell::Cons { head, tail } => {
                    self.budget -= 1;
                    self.next = Some(*tail);
                    Some(Ok(*head))
                }
                _ => Some(Err(HeapError::NotAList(cell_ref.0))),
            },
            Err(err) => Some(Err(err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reserve_respects_limit() {
        let mut heap = Heap::new(4, 10);
        assert!(heap.reserve(10).is_ok());
        heap.new_var().unwrap();
        let err = heap.reserve(10).unwrap_err();
        assert_eq!(
            err,
            HeapError::Overflow {
                requested: 11,
                in_use: 1,
                limit: 10
            }
        );
    }

    #[test]
    fn test_push_past_limit_fails() {
        let mut heap = Heap::new(0, 2);
        heap.new_var().unwrap();
        heap.new_var().unwrap();
        assert!(matches!(heap.new_var(), Err(HeapError::Overflow { .. })));
    }

    #[test]
    fn test_build_and_walk_list() {
        let mut heap = Heap::new(16, 64);
        let root = heap.new_var().unwrap();
        let (h, t) = heap.bind_list(root).unwrap();
        heap.bind_int(h, 7).unwrap();
        let (h2, t2) = heap.bind_list(t).unwrap();
        heap.bind_int(h2, 9).unwrap();
        heap.bind_nil(t2).unwrap();

        let values: Vec<i64> = heap
            .list_iter(root)
            .map(|item| heap.int_value(item.unwrap()).unwrap().unwrap())
            .collect();
        assert_eq!(values, vec![7, 9]);
    }

    #[test]
    fn test_double_bind_rejected() {
        let mut heap = Heap::new(4, 8);
        let v = heap.new_var().unwrap();
        heap.bind_int(v, 1).unwrap();
        assert_eq!(heap.bind_nil(v), Err(HeapError::NotUnbound(0)));
        assert_eq!(heap.bind_list(v), Err(HeapError::NotUnbound(0)));
        assert_eq!(heap.len(), 1);
    }

    #[test]
    fn test_functor_args_are_fresh() {
        let mut heap = Heap::new(8, 8);
        let goal = heap.new_var().unwrap();
        let args = heap.bind_functor(goal, "ipTest", 3).unwrap();
        assert_eq!(args.len(), 3);
        for arg in &args {
            assert!(heap.is_unbound(*arg).unwrap());
        }
        let (name, arity) = heap.functor(goal).unwrap().unwrap();
        assert_eq!(&*name, "ipTest");
        assert_eq!(arity, 3);
        assert_eq!(heap.arg(goal, 1).unwrap(), Some(args[0]));
        assert_eq!(heap.arg(goal, 0).unwrap(), None);
    }

    #[test]
    fn test_bind_term_follows_refs() {
        let mut heap = Heap::new(8, 8);
        let a = heap.new_var().unwrap();
        let b = heap.new_var().unwrap();
        heap.bind_nil(b).unwrap();
        heap.bind_term(a, b).unwrap();
        assert!(heap.is_nil(a).unwrap());
        assert_eq!(heap.list_iter(a).count(), 0);
    }

    #[test]
    fn test_improper_list_reports_cell() {
        let mut heap = Heap::new(8, 8);
        let root = heap.new_var().unwrap();
        let (h, t) = heap.bind_list(root).unwrap();
        heap.bind_int(h, 1).unwrap();
        heap.bind_int(t, 2).unwrap();
        let items: Vec<_> = heap.list_iter(root).collect();
        assert_eq!(items.len(), 2);
        assert_eq!(items[1], Err(HeapError::NotAList(t.index())));
    }

    #[test]
    fn test_cyclic_list_walk_stops() {
        let mut heap = Heap::new(8, 8);
        let root = heap.new_var().unwrap();
        let (h, t) = heap.bind_list(root).unwrap();
        heap.bind_int(h, 1).unwrap();
        heap.bind_term(t, root).unwrap();

        let items: Vec<_> = heap.list_iter(root).collect();
        assert_eq!(items.len(), heap.len() + 1);
        assert!(matches!(items.last(), Some(Err(HeapError::Unterminated(_)))));
    }
}
