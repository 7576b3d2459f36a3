//! Cursors: a point, a mark, and the selection between them.

/// One cursor in a window.  A selection exists when `point != mark` and the
/// window shows marks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Cursor {
    pub point: u64,
    pub mark: u64,
    /// Copies from this cursor go to a cursor-local chain instead of the
    /// shared one, so multi-cursor paste keeps per-cursor text.
    pub local_copy_chain: bool,
}

impl Cursor {
    pub fn at(pos: u64) -> Cursor {
        Cursor {
            point: pos,
            mark: pos,
            local_copy_chain: false,
        }
    }

    pub fn with_region(mark: u64, point: u64) -> Cursor {
        Cursor {
            point,
            mark,
            local_copy_chain: false,
        }
    }

    /// Lower end of the region.
    pub fn start(&self) -> u64 {
        self.point.min(self.mark)
    }

    /// Upper end of the region.
    pub fn end(&self) -> u64 {
        self.point.max(self.mark)
    }

    pub fn has_region(&self) -> bool {
        self.point != self.mark
    }
}

/// Sort cursors by point, keeping relative order of ties.
pub fn sort_cursors(cursors: &mut [Cursor], selected: &mut usize) {
    let selected_cursor = cursors.get(*selected).copied();
    cursors.sort_by_key(|cursor| cursor.point);
    if let Some(target) = selected_cursor {
        if let Some(index) = cursors.iter().position(|cursor| *cursor == target) {
            *selected = index;
        }
    }
}

/// Drop coincident cursors (same point), keeping the earliest and biasing
/// the selected index so the same cursor stays selected.
pub fn dedup_cursors(cursors: &mut Vec<Cursor>, selected: &mut usize) {
    let mut index = 1;
    while index < cursors.len() {
        if cursors[index].point == cursors[index - 1].point {
            cursors.remove(index);
            if *selected >= index {
                *selected -= 1;
            }
        } else {
            index += 1;
        }
    }
    if *selected >= cursors.len() {
        *selected = cursors.len().saturating_sub(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_region_endpoints() {
        let cursor = Cursor::with_region(7, 3);
        assert_eq!(cursor.start(), 3);
        assert_eq!(cursor.end(), 7);
        assert!(cursor.has_region());
        assert!(!Cursor::at(5).has_region());
    }

    #[test]
    fn test_sort_tracks_selected() {
        let mut cursors = vec![Cursor::at(9), Cursor::at(2), Cursor::at(5)];
        let mut selected = 0;
        sort_cursors(&mut cursors, &mut selected);
        assert_eq!(
            cursors.iter().map(|c| c.point).collect::<Vec<_>>(),
            vec![2, 5, 9]
        );
        assert_eq!(selected, 2);
    }

    #[test]
    fn test_sort_is_idempotent() {
        let mut cursors = vec![Cursor::at(2), Cursor::at(5), Cursor::at(9)];
        let mut selected = 1;
        sort_cursors(&mut cursors, &mut selected);
        let snapshot = cursors.clone();
        sort_cursors(&mut cursors, &mut selected);
        assert_eq!(cursors, snapshot);
        assert_eq!(selected, 1);
    }

    #[test]
    fn test_dedup_keeps_earliest_and_biases_selected() {
        let mut cursors = vec![Cursor::at(2), Cursor::at(2), Cursor::at(5), Cursor::at(5)];
        let mut selected = 3;
        dedup_cursors(&mut cursors, &mut selected);
        assert_eq!(
            cursors.iter().map(|c| c.point).collect::<Vec<_>>(),
            vec![2, 5]
        );
        assert_eq!(selected, 1);

        // Idempotent.
        let snapshot = cursors.clone();
        dedup_cursors(&mut cursors, &mut selected);
        assert_eq!(cursors, snapshot);
    }
}
