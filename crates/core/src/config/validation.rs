use super::types::FarmConfig;
use crate::error::CoreError;

impl FarmConfig {
    /// Validate the config: branching bounds, frame capacity, worker count.
    pub fn validate(&self) -> Result<(), CoreError> {
        self.validate_branching()?;
        self.validate_capacity()?;
        self.validate_workers()?;
        Ok(())
    }

    fn validate_branching(&self) -> Result<(), CoreError> {
        let tree = &self.tree;
        if tree.min_children > tree.max_children {
            return Err(CoreError::Config(format!(
                "tree.min_children ({}) exceeds tree.max_children ({})",
                tree.min_children, tree.max_children
            )));
        }
        if !(0.0..=1.0).contains(&tree.branch_probability) {
            return Err(CoreError::Config(format!(
                "tree.branch_probability must be within [0, 1], got {}",
                tree.branch_probability
            )));
        }
        Ok(())
    }

    /// Every possible child batch must fit one fixed-size report.
    fn validate_capacity(&self) -> Result<(), CoreError> {
        let capacity = self.channel.batch_capacity;
        if capacity == 0 {
            return Err(CoreError::Config(
                "channel.batch_capacity must be at least 1".into(),
            ));
        }
        if self.tree.max_children > capacity {
            return Err(CoreError::Config(format!(
                "tree.max_children ({}) exceeds channel.batch_capacity ({capacity})",
                self.tree.max_children
            )));
        }
        Ok(())
    }

    fn validate_workers(&self) -> Result<(), CoreError> {
        if self.workers.count == 0 {
            return Err(CoreError::Config("workers.count must be at least 1".into()));
        }
        Ok(())
    }
}
