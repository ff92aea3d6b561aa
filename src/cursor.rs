/// A forward-only cursor over a non-empty stream. The final element (for
/// tokens, the end-of-input marker) is sticky: advancing past it is a no-op.
#[derive(Debug)]
pub struct Cursor<T> {
    stream: Vec<T>,
    index: usize,
}

impl<T> Cursor<T> {
    pub fn new(stream: Vec<T>) -> Self {
        assert!(!stream.is_empty(), "cursor requires a terminated stream");
        Cursor { stream, index: 0 }
    }

    /// The element under the cursor.
    pub fn peek(&self) -> &T {
        &self.stream[self.index]
    }

    /// The most recently consumed element, or the first one if nothing has
    /// been consumed yet.
    pub fn previous(&self) -> &T {
        &self.stream[self.index.saturating_sub(1)]
    }

    pub fn is_last(&self) -> bool {
        self.index + 1 >= self.stream.len()
    }

    /// Moves the cursor forward by one, unless it already sits on the last
    /// element.
    pub fn bump(&mut self) {
        if !self.is_last() {
            self.index += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bump_stops_on_the_last_element() {
        let mut cursor = Cursor::new(vec!['a', 'b']);
        assert_eq!(*cursor.peek(), 'a');
        cursor.bump();
        assert_eq!(*cursor.peek(), 'b');
        assert_eq!(*cursor.previous(), 'a');
        assert!(cursor.is_last());
        cursor.bump();
        assert_eq!(*cursor.peek(), 'b');
    }
}
