use crate::cardinality::Cardinality;
use crate::stage::{StageInfo, StageKind};
use std::fmt;

type Operation<I, O> = Box<dyn Fn(I) -> O + Send + Sync>;

/// Ordered chain of transform stages.
///
/// `I` is the input the pipeline is invoked with, `O` the output of the last
/// registered stage. Registering a stage consumes the pipeline and returns a
/// new one whose output type is that stage's output, so element types may
/// change from stage to stage.
pub struct Pipeline<I, O> {
    stages: Vec<StageInfo>,
    operation: Operation<I, O>,
}

impl<T: 'static> Pipeline<Vec<T>, Vec<T>> {
    pub fn new() -> Self {
        Self {
            stages: Vec::new(),
            operation: Box::new(|sequence: Vec<T>| sequence),
        }
    }
}

impl<T: 'static> Default for Pipeline<Vec<T>, Vec<T>> {
    fn default() -> Self {
        Self::new()
    }
}

impl<I: 'static, O: 'static> Pipeline<I, O> {
    /// Run every stage, left to right, on `input`
    pub fn run(&self, input: I) -> O {
        (self.operation)(input)
    }

    /// Registered stages in execution order
    pub fn stages(&self) -> &[StageInfo] {
        &self.stages
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Whole-value transform, e.g. sorting a grouped result
    pub fn apply<P, F>(self, name: impl Into<String>, function: F) -> Pipeline<I, P>
    where
        O: Cardinality,
        P: 'static,
        F: Fn(O) -> P + Send + Sync + 'static,
    {
        let info = StageInfo::new(StageKind::Apply, name);
        let label = info.to_string();
        self.push(info, move |value: O| {
            let before = value.cardinality();
            let result = function(value);
            log::debug!("{} applied to {} items.", label, describe(before));
            result
        })
    }

    fn push<P: 'static>(
        self,
        info: StageInfo,
        stage: impl Fn(O) -> P + Send + Sync + 'static,
    ) -> Pipeline<I, P> {
        let Pipeline {
            mut stages,
            operation,
        } = self;
        stages.push(info);
        Pipeline {
            stages,
            operation: Box::new(move |input: I| stage(operation(input))),
        }
    }
}

impl<I: 'static, T: 'static> Pipeline<I, Vec<T>> {
    /// Element-wise transform
    pub fn map<U, F>(self, name: impl Into<String>, function: F) -> Pipeline<I, Vec<U>>
    where
        U: 'static,
        F: Fn(T) -> U + Send + Sync + 'static,
    {
        let info = StageInfo::new(StageKind::Map, name);
        let label = info.to_string();
        self.push(info, move |sequence: Vec<T>| {
            let before = sequence.len();
            let result: Vec<U> = sequence.into_iter().map(&function).collect();
            log::debug!("{} applied to {} items.", label, before);
            result
        })
    }

    /// Keep the elements matching `predicate`, in order
    pub fn filter<F>(self, name: impl Into<String>, predicate: F) -> Pipeline<I, Vec<T>>
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        let info = StageInfo::new(StageKind::Filter, name);
        let label = info.to_string();
        self.push(info, move |sequence: Vec<T>| {
            let before = sequence.len();
            let result: Vec<T> = sequence.into_iter().filter(|item| predicate(item)).collect();
            log::debug!("{} filtered {} items to {}.", label, before, result.len());
            result
        })
    }

    /// Fold the sequence into one accumulator.
    ///
    /// `seed` is called with the input sequence right before folding, so the
    /// initial accumulator is built fresh on every run.
    pub fn reduce<A, F, S>(self, name: impl Into<String>, function: F, seed: S) -> Pipeline<I, A>
    where
        A: Cardinality + 'static,
        F: Fn(A, T) -> A + Send + Sync + 'static,
        S: Fn(&[T]) -> A + Send + Sync + 'static,
    {
        let info = StageInfo::new(StageKind::Reduce, name);
        let label = info.to_string();
        self.push(info, move |sequence: Vec<T>| {
            let before = sequence.len();
            let initial = seed(&sequence);
            let result = sequence.into_iter().fold(initial, &function);
            log::debug!(
                "{} reduced {} items to {}.",
                label,
                before,
                describe(result.cardinality())
            );
            result
        })
    }
}

impl<I: 'static, T: 'static> Pipeline<I, Vec<Option<T>>> {
    /// Drop empty slots left by a fallible `map`, unwrapping the rest
    pub fn filter_some(self, name: impl Into<String>) -> Pipeline<I, Vec<T>> {
        let info = StageInfo::new(StageKind::Filter, name);
        let label = info.to_string();
        self.push(info, move |sequence: Vec<Option<T>>| {
            let before = sequence.len();
            let result: Vec<T> = sequence.into_iter().flatten().collect();
            log::debug!("{} filtered {} items to {}.", label, before, result.len());
            result
        })
    }
}

impl<I, O> fmt::Debug for Pipeline<I, O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("stages", &self.stages)
            .finish()
    }
}

fn describe(size: Option<usize>) -> String {
    size.map_or_else(|| "?".to_string(), |n| n.to_string())
}
