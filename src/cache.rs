/// Holds the most recent linearization of an operator.
///
/// The cache is either empty or holds a value consistent with the last successful
/// linearization. Any operation that changes what a linearization would produce must call
/// [`invalidate`](Self::invalidate), after which the value is no longer handed out. The storage
/// itself is dropped only when a new value replaces it, so that a failed rebuild never destroys
/// the previous result before the new one exists.
#[derive(Debug, Clone)]
pub struct LinearizationCache<M> {
    value: Option<M>,
    valid: bool,
}

impl<M> Default for LinearizationCache<M> {
    fn default() -> Self {
        Self {
            value: None,
            valid: false,
        }
    }
}

impl<M> LinearizationCache<M> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a new linearization, dropping the old one, and returns a reference to it.
    pub fn replace(&mut self, value: M) -> &M {
        self.valid = true;
        self.value.insert(value)
    }

    pub fn invalidate(&mut self) {
        self.valid = false;
    }

    pub fn is_valid(&self) -> bool {
        self.valid && self.value.is_some()
    }

    /// The cached linearization, if it is still valid.
    pub fn get(&self) -> Option<&M> {
        self.value.as_ref().filter(|_| self.valid)
    }
}
