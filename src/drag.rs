/// Moves a borderless window by its custom title bar.
///
/// On press we remember where the pointer sits inside the window; every motion
/// event after that places the window so the pointer stays at the same spot.
#[derive(Debug, Default, Clone, Copy)]
pub struct DragTracker {
    offset: Option<(i32, i32)>,
}

impl DragTracker {
    pub fn press(&mut self, window_pos: (i32, i32), pointer_root: (i32, i32)) {
        self.offset = Some((pointer_root.0 - window_pos.0, pointer_root.1 - window_pos.1));
    }

    /// New window position, or `None` when no drag is in progress.
    pub fn motion(&self, pointer_root: (i32, i32)) -> Option<(i32, i32)> {
        self.offset.map(|(dx, dy)| (pointer_root.0 - dx, pointer_root.1 - dy))
    }

    pub fn release(&mut self) {
        self.offset = None;
    }

    pub fn is_dragging(&self) -> bool {
        self.offset.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_follows_pointer() {
        let mut drag = DragTracker::default();
        assert_eq!(drag.motion((10, 10)), None);

        drag.press((100, 200), (130, 210));
        assert!(drag.is_dragging());
        assert_eq!(drag.motion((130, 210)), Some((100, 200)));
        assert_eq!(drag.motion((180, 150)), Some((150, 140)));

        drag.release();
        assert!(!drag.is_dragging());
        assert_eq!(drag.motion((0, 0)), None);
    }
}
