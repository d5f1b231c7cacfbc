//! Two-slot selection of data points for side-by-side comparison.

/// Selection slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
  Left,
  Right,
}

/// Result of toggling a point
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Toggle {
  Selected(Slot),
  Deselected(Slot),
  /// Both slots are taken by other points.
  Rejected,
}

/// At most two selected points. Selecting a selected point frees its slot;
/// a third distinct point is rejected until a slot frees.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompareSelection<T> {
  left: Option<T>,
  right: Option<T>,
}

impl<T> Default for CompareSelection<T> {
  fn default() -> Self {
    Self {
      left: None,
      right: None,
    }
  }
}

impl<T: PartialEq> CompareSelection<T> {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn toggle(&mut self, point: T) -> Toggle {
    if self.left.as_ref() == Some(&point) {
      self.left = None;
      return Toggle::Deselected(Slot::Left);
    }
    if self.right.as_ref() == Some(&point) {
      self.right = None;
      return Toggle::Deselected(Slot::Right);
    }

    if self.left.is_none() {
      self.left = Some(point);
      Toggle::Selected(Slot::Left)
    } else if self.right.is_none() {
      self.right = Some(point);
      Toggle::Selected(Slot::Right)
    } else {
      Toggle::Rejected
    }
  }

  pub fn left(&self) -> Option<&T> {
    self.left.as_ref()
  }

  pub fn right(&self) -> Option<&T> {
    self.right.as_ref()
  }

  pub fn is_selected(&self, point: &T) -> bool {
    self.left.as_ref() == Some(point) || self.right.as_ref() == Some(point)
  }

  /// Both points, once two are selected.
  pub fn pair(&self) -> Option<(&T, &T)> {
    Some((self.left.as_ref()?, self.right.as_ref()?))
  }

  pub fn clear(&mut self) {
    self.left = None;
    self.right = None;
  }
}
