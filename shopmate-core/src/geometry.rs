//! Floating-widget placement and pointer dragging
//!
//! Geometry is owned by one widget instance and mutated only by the drag
//! interaction. It never reads or writes conversation state, so a drag can
//! start, proceed and end at any point during a stream.
//!
//! Coordinates are terminal cells. Position is signed: a drag may move the
//! window partially out of view and back; clamping happens at draw time.

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Size {
    pub width: u16,
    pub height: u16,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct WidgetGeometry {
    pub position: Point,
    pub size: Size,
}

pub const DEFAULT_SIZE: Size = Size {
    width: 46,
    height: 18,
};

/// Gap kept between the widget and the viewport edge at mount.
const MARGIN: i32 = 2;

impl WidgetGeometry {
    /// Anchor the widget to the bottom-right of the viewport.
    ///
    /// Computed once at mount from the viewport dimensions; never
    /// recalculated afterwards, only moved by dragging.
    pub fn anchored(viewport: Size) -> Self {
        let size = DEFAULT_SIZE;
        WidgetGeometry {
            position: Point {
                x: (viewport.width as i32 - size.width as i32 - MARGIN).max(0),
                y: (viewport.height as i32 - size.height as i32 - MARGIN).max(0),
            },
            size,
        }
    }
}

/// Pointer-delta drag tracking.
///
/// Begun on pointer-down over the title region, advanced on every
/// pointer-move, released unconditionally on pointer-up. Working in deltas
/// from the last recorded pointer (rather than absolute positions) keeps the
/// drag correct even when the pointer leaves the widget's own bounds.
#[derive(Debug, Default)]
pub struct DragState {
    last_pointer: Option<Point>,
}

impl DragState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_dragging(&self) -> bool {
        self.last_pointer.is_some()
    }

    pub fn begin(&mut self, at: Point) {
        self.last_pointer = Some(at);
    }

    /// Apply the move delta since the last recorded pointer position to the
    /// widget, then record the new position. Ignored when not dragging.
    pub fn update(&mut self, geometry: &mut WidgetGeometry, at: Point) {
        let Some(last) = self.last_pointer else {
            return;
        };
        geometry.position.x += at.x - last.x;
        geometry.position.y += at.y - last.y;
        self.last_pointer = Some(at);
    }

    pub fn end(&mut self) {
        self.last_pointer = None;
    }
}
