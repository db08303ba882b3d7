use crate::store::GraphStore;

impl GraphStore {
    /// Drops every live entry the last serialize pass did not reach.
    ///
    /// Returns the number of entries removed.
    pub(crate) fn collect_garbage(&mut self) -> usize {
        let before = self.live.len();
        let reachable = &self.reachable;
        self.live.retain(|id, _| {
            let keep = reachable.contains(id);
            if !keep {
                log::trace!("collecting {id}");
            }
            keep
        });
        before - self.live.len()
    }
}
