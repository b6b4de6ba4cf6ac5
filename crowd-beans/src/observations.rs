use std::collections::HashMap;

/// One answer: `worker` gave `label` to `task`. All three are indices
/// into the name tables of the owning [`CrowdLabels`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Observation {
    pub task: usize,
    pub worker: usize,
    pub label: usize,
}

/// Names interned in order of first appearance
#[derive(Debug, Clone, Default)]
pub struct NameIndex {
    names: Vec<Box<str>>,
    index: HashMap<Box<str>, usize>,
}

impl NameIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the index of `name`, registering it if it is new
    pub fn intern(&mut self, name: &str) -> usize {
        if let Some(&i) = self.index.get(name) {
            return i;
        }
        let i = self.names.len();
        let name: Box<str> = name.into();
        self.names.push(name.clone());
        self.index.insert(name, i);
        i
    }

    pub fn get(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    pub fn name(&self, i: usize) -> &str {
        &self.names[i]
    }

    pub fn names(&self) -> &[Box<str>] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Long-format crowd labelling table.
///
/// Tasks, workers and labels are enumerated in order of first
/// appearance. Duplicate `(task, worker)` pairs are kept as independent
/// observations. The task -> observations and worker -> observations
/// adjacency lists are built once here and never change.
#[derive(Debug, Clone)]
pub struct CrowdLabels {
    tasks: NameIndex,
    workers: NameIndex,
    labels: NameIndex,
    observations: Vec<Observation>,
    task_observations: Vec<Vec<usize>>,
    worker_observations: Vec<Vec<usize>>,
}

impl CrowdLabels {
    /// Build a table from `(task, worker, label)` triplets
    ///
    /// * `triplets` - any iterator of string-like triplets
    ///
    /// Fails on an empty observation set.
    pub fn from_triplets<I, S>(triplets: I) -> anyhow::Result<Self>
    where
        I: IntoIterator<Item = (S, S, S)>,
        S: AsRef<str>,
    {
        let mut tasks = NameIndex::new();
        let mut workers = NameIndex::new();
        let mut labels = NameIndex::new();
        let mut observations = vec![];

        for (task, worker, label) in triplets {
            observations.push(Observation {
                task: tasks.intern(task.as_ref()),
                worker: workers.intern(worker.as_ref()),
                label: labels.intern(label.as_ref()),
            });
        }

        if observations.is_empty() {
            anyhow::bail!("empty observation set: need at least one (task, worker, label) row");
        }

        let mut task_observations = vec![vec![]; tasks.len()];
        let mut worker_observations = vec![vec![]; workers.len()];
        for (i, obs) in observations.iter().enumerate() {
            task_observations[obs.task].push(i);
            worker_observations[obs.worker].push(i);
        }

        Ok(CrowdLabels {
            tasks,
            workers,
            labels,
            observations,
            task_observations,
            worker_observations,
        })
    }

    pub fn num_tasks(&self) -> usize {
        self.tasks.len()
    }

    pub fn num_workers(&self) -> usize {
        self.workers.len()
    }

    pub fn num_labels(&self) -> usize {
        self.labels.len()
    }

    pub fn num_observations(&self) -> usize {
        self.observations.len()
    }

    pub fn tasks(&self) -> &NameIndex {
        &self.tasks
    }

    pub fn workers(&self) -> &NameIndex {
        &self.workers
    }

    pub fn labels(&self) -> &NameIndex {
        &self.labels
    }

    pub fn observations(&self) -> &[Observation] {
        &self.observations
    }

    /// Indices of the observations made on task `t`
    pub fn task_observations(&self, t: usize) -> &[usize] {
        &self.task_observations[t]
    }

    /// Indices of the observations made by worker `w`
    pub fn worker_observations(&self, w: usize) -> &[usize] {
        &self.worker_observations[w]
    }

    /// Iterate over `(task, worker, label)` names in the input order
    pub fn triplet_names(&self) -> impl Iterator<Item = (&str, &str, &str)> + '_ {
        self.observations.iter().map(|obs| {
            (
                self.tasks.name(obs.task),
                self.workers.name(obs.worker),
                self.labels.name(obs.label),
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_appearance_order() -> anyhow::Result<()> {
        let data = CrowdLabels::from_triplets(vec![
            ("t2", "w1", "B"),
            ("t1", "w1", "A"),
            ("t2", "w2", "A"),
            ("t1", "w3", "C"),
        ])?;

        assert_eq!(data.tasks().name(0), "t2");
        assert_eq!(data.tasks().name(1), "t1");
        assert_eq!(data.workers().len(), 3);
        assert_eq!(data.labels().name(0), "B");
        assert_eq!(data.labels().name(2), "C");
        assert_eq!(data.num_observations(), 4);
        Ok(())
    }

    #[test]
    fn adjacency_lists() -> anyhow::Result<()> {
        let data = CrowdLabels::from_triplets(vec![
            ("t1", "w1", "A"),
            ("t1", "w2", "B"),
            ("t2", "w1", "A"),
            ("t1", "w1", "A"),
        ])?;

        assert_eq!(data.task_observations(0), &[0, 1, 3]);
        assert_eq!(data.task_observations(1), &[2]);
        assert_eq!(data.worker_observations(0), &[0, 2, 3]);
        assert_eq!(data.worker_observations(1), &[1]);
        Ok(())
    }

    #[test]
    fn empty_input_is_rejected() {
        let empty: Vec<(&str, &str, &str)> = vec![];
        assert!(CrowdLabels::from_triplets(empty).is_err());
    }
}
