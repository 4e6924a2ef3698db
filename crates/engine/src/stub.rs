//! Stub worker drivers.
//!
//! The driver turns a job's input records into grouped [`StubInput`]s,
//! spreads them over worker threads, and collects the result records. The
//! workers and the driver rendezvous exclusively through stub channels, so
//! a cooperative stop can always unblock both sides.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use fdp_channel::{Item, KeyValueChannel, StubChannel};
use fdp_common::RuntimeError;
use fdp_model::{LogicFactory, PatternJob, PatternKind, StubInput};
use fdp_schema::{Record, Value};
use tracing::{debug, warn};

/// Structural hash used for key partitioning. Stable across workers within
/// one process; doubles are hashed by bit pattern.
pub fn value_hash(value: &Value) -> u64 {
    let mut hasher = DefaultHasher::new();
    hash_value(value, &mut hasher);
    hasher.finish()
}

fn hash_value(value: &Value, hasher: &mut DefaultHasher) {
    match value {
        Value::Nil => 0u8.hash(hasher),
        Value::Str(s) => {
            1u8.hash(hasher);
            s.hash(hasher);
        }
        Value::Int(i) => {
            2u8.hash(hasher);
            i.hash(hasher);
        }
        Value::Long(l) => {
            3u8.hash(hasher);
            l.hash(hasher);
        }
        Value::Double(d) => {
            4u8.hash(hasher);
            d.to_bits().hash(hasher);
        }
        Value::Array(items) => {
            5u8.hash(hasher);
            for item in items {
                hash_value(item, hasher);
            }
        }
        Value::Record(fields) => {
            6u8.hash(hasher);
            for (name, v) in fields {
                name.hash(hasher);
                hash_value(v, hasher);
            }
        }
        Value::Opaque(bytes) => {
            7u8.hash(hasher);
            bytes.hash(hasher);
        }
    }
}

/// Group records by key in first-seen key order.
pub fn group_by_key(records: &[Record]) -> Vec<(Value, Vec<Value>)> {
    let mut groups: Vec<(Value, Vec<Value>)> = Vec::new();
    for record in records {
        match groups.iter_mut().find(|(key, _)| *key == record.key) {
            Some((_, values)) => values.push(record.value.clone()),
            None => groups.push((record.key.clone(), vec![record.value.clone()])),
        }
    }
    groups
}

/// Run one pattern job's logic over its input records.
///
/// `inputs` holds one record vector per input stream (two for the dual
/// patterns). `degree` workers are spawned; grouped patterns partition by
/// key hash so one key never spans workers.
pub fn run_pattern(
    job: &PatternJob,
    factory: &LogicFactory,
    inputs: Vec<Vec<Record>>,
    degree: u32,
    stop: &Arc<AtomicBool>,
) -> Result<Vec<Record>, RuntimeError> {
    let degree = degree.max(1) as usize;
    if stop.load(Ordering::SeqCst) {
        debug!(job = %job.name, operator = "StubDriver", "stop requested before dispatch");
        return Ok(Vec::new());
    }

    let left = inputs.first().cloned().unwrap_or_default();
    let right = inputs.get(1).cloned().unwrap_or_default();

    match job.kind {
        PatternKind::Map => {
            let stub_inputs = left.into_iter().map(StubInput::Map).collect();
            run_workers(&job.name, factory, round_robin(stub_inputs, degree), stop)
        }
        PatternKind::Reduce => {
            if job.use_combiner && degree > 1 {
                // Pre-aggregate per partition, then reduce the partials in a
                // single final pass.
                let partials = run_workers(
                    &job.name,
                    factory,
                    by_key_hash(reduce_inputs(&left), degree),
                    stop,
                )?;
                if stop.load(Ordering::SeqCst) {
                    return Ok(partials);
                }
                run_workers(&job.name, factory, vec![reduce_inputs(&partials)], stop)
            } else {
                run_workers(
                    &job.name,
                    factory,
                    by_key_hash(reduce_inputs(&left), degree),
                    stop,
                )
            }
        }
        PatternKind::Cross => {
            let mut pairs = Vec::with_capacity(left.len() * right.len());
            for a in &left {
                for b in &right {
                    pairs.push(StubInput::Cross(a.clone(), b.clone()));
                }
            }
            run_workers(&job.name, factory, round_robin(pairs, degree), stop)
        }
        PatternKind::CoGroup => {
            let left_groups = group_by_key(&left);
            let right_groups = group_by_key(&right);
            let mut keys: Vec<Value> = left_groups.iter().map(|(k, _)| k.clone()).collect();
            for (key, _) in &right_groups {
                if !keys.contains(key) {
                    keys.push(key.clone());
                }
            }
            let stub_inputs = keys
                .into_iter()
                .map(|key| {
                    let take = |groups: &[(Value, Vec<Value>)]| {
                        groups
                            .iter()
                            .find(|(k, _)| *k == key)
                            .map(|(_, vs)| vs.clone())
                            .unwrap_or_default()
                    };
                    StubInput::CoGroup {
                        left: take(&left_groups),
                        right: take(&right_groups),
                        key,
                    }
                })
                .collect();
            run_workers(&job.name, factory, by_key_hash(stub_inputs, degree), stop)
        }
        PatternKind::Match => {
            let left_groups = group_by_key(&left);
            let right_groups = group_by_key(&right);
            let mut pairs = Vec::new();
            for (key, left_values) in &left_groups {
                if let Some((_, right_values)) =
                    right_groups.iter().find(|(k, _)| k == key)
                {
                    for l in left_values {
                        for r in right_values {
                            pairs.push(StubInput::Match {
                                key: key.clone(),
                                left: l.clone(),
                                right: r.clone(),
                            });
                        }
                    }
                }
            }
            run_workers(&job.name, factory, by_key_hash(pairs, degree), stop)
        }
    }
}

fn reduce_inputs(records: &[Record]) -> Vec<StubInput> {
    group_by_key(records)
        .into_iter()
        .map(|(key, values)| StubInput::Reduce { key, values })
        .collect()
}

fn round_robin(inputs: Vec<StubInput>, degree: usize) -> Vec<Vec<StubInput>> {
    let mut partitions = vec![Vec::new(); degree];
    for (i, input) in inputs.into_iter().enumerate() {
        partitions[i % degree].push(input);
    }
    partitions
}

fn input_key(input: &StubInput) -> Option<&Value> {
    match input {
        StubInput::Reduce { key, .. }
        | StubInput::CoGroup { key, .. }
        | StubInput::Match { key, .. } => Some(key),
        StubInput::Map(_) | StubInput::Cross(..) => None,
    }
}

fn by_key_hash(inputs: Vec<StubInput>, degree: usize) -> Vec<Vec<StubInput>> {
    let mut partitions = vec![Vec::new(); degree];
    for (i, input) in inputs.into_iter().enumerate() {
        let slot = match input_key(&input) {
            Some(key) => (value_hash(key) % degree as u64) as usize,
            None => i % degree,
        };
        partitions[slot].push(input);
    }
    partitions
}

/// Spawn one worker per partition and collect everything they produce.
///
/// Input channels are sized to their partition so the driver never blocks
/// filling them. Each worker publishes its results on its own key/value
/// channel pair (key pushed before value, one producer per pair); the
/// driver drains the pairs in worker order while the remaining workers
/// keep running.
fn run_workers(
    job_name: &str,
    factory: &LogicFactory,
    partitions: Vec<Vec<StubInput>>,
    stop: &Arc<AtomicBool>,
) -> Result<Vec<Record>, RuntimeError> {
    let mut handles = Vec::with_capacity(partitions.len());
    let mut outputs = Vec::with_capacity(partitions.len());

    for partition in partitions {
        let input: Arc<StubChannel<StubInput>> =
            Arc::new(StubChannel::with_capacity(partition.len().max(1)));
        for item in partition {
            input.push(item);
        }
        input.cancel();

        let output = Arc::new(KeyValueChannel::new());
        outputs.push(Arc::clone(&output));

        let mut logic = factory();
        let stop = Arc::clone(stop);
        let name = job_name.to_string();
        handles.push(thread::spawn(move || -> Result<(), RuntimeError> {
            let result = loop {
                if stop.load(Ordering::SeqCst) {
                    debug!(job = %name, operator = "StubWorker", "stopping early");
                    break Ok(());
                }
                match input.pop() {
                    Item::Finish => break Ok(()),
                    Item::Data(stub_input) => match logic.run_iteration(stub_input) {
                        Ok(records) => {
                            for record in records {
                                output.push_record(record);
                            }
                        }
                        Err(e) => break Err(e),
                    },
                }
            };
            output.cancel();
            result
        }));
    }

    // Drain each worker's pair until its sentinel.
    let mut results = Vec::new();
    for output in &outputs {
        loop {
            match output.pop_record() {
                Item::Data(record) => results.push(record),
                Item::Finish => break,
            }
        }
    }

    let mut first_error = None;
    for handle in handles {
        match handle.join() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                first_error.get_or_insert(e);
            }
            Err(_) => {
                warn!(job = job_name, operator = "StubDriver", "worker thread panicked");
                first_error
                    .get_or_insert(RuntimeError::ChannelDisconnected(job_name.to_string()));
            }
        }
    }
    match first_error {
        Some(e) => Err(e),
        None => Ok(results),
    }
}
