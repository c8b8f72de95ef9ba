//! Broadcasting of nested values
//!
//! Nodes that consume several inputs positionally (X, Y and Z channels
//! forming vectors, or one matrix per mesh) first align the inputs to a
//! common length at every level they consume. Two policies exist and the
//! node picks one per group of inputs:
//!
//! - [`Alignment::RepeatLast`]: shorter sequences repeat their last element.
//! - [`Alignment::Cycle`]: shorter sequences wrap around from their start.
//!
//! Both are pure functions of their inputs. Length mismatch never fails.

use serde::{Deserialize, Serialize};

use crate::value::NestedValue;

/// How shorter sequences are extended to the target length
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Alignment {
    /// Repeat the last element until the target length is reached
    #[default]
    RepeatLast,
    /// Wrap around from the first element
    Cycle,
}

/// Extend `items` to `len` by repeating its last element
///
/// Never truncates. An empty list stays empty.
pub fn full_list<T: Clone>(items: &mut Vec<T>, len: usize) {
    if let Some(last) = items.last().cloned() {
        if items.len() < len {
            items.resize(len, last);
        }
    }
}

/// Extend `items` to `len` by cycling from its start
///
/// Never truncates. An empty list stays empty.
pub fn cycle_to_len<T: Clone>(items: &mut Vec<T>, len: usize) {
    let original = items.len();
    if original == 0 || original >= len {
        return;
    }
    items.reserve(len - original);
    for i in original..len {
        let item = items[i % original].clone();
        items.push(item);
    }
}

/// Extend every list to the length of the longest one
///
/// Empty lists are left empty. Returns the target length.
pub fn match_lengths<T: Clone>(lists: &mut [Vec<T>], policy: Alignment) -> usize {
    let target = lists.iter().map(Vec::len).max().unwrap_or(0);
    for list in lists.iter_mut() {
        match policy {
            Alignment::RepeatLast => full_list(list, target),
            Alignment::Cycle => cycle_to_len(list, target),
        }
    }
    target
}

/// Options for aligning a group of channels
#[derive(Debug, Clone, Default)]
pub struct BroadcastOptions {
    /// Policy used at every level without an override
    pub policy: Alignment,
    /// Per-level overrides, index 0 is the object level
    pub level_policies: Vec<Alignment>,
    /// Number of levels to align (1 aligns object counts only)
    pub depth: usize,
    /// Per-channel element used when a channel is empty
    pub defaults: Vec<Option<NestedValue>>,
}

impl BroadcastOptions {
    pub fn new(policy: Alignment, depth: usize) -> Self {
        Self {
            policy,
            depth,
            ..Self::default()
        }
    }

    /// Override the policy at one level
    pub fn at_level(mut self, level: usize, policy: Alignment) -> Self {
        if self.level_policies.len() <= level {
            self.level_policies.resize(level + 1, self.policy);
        }
        self.level_policies[level] = policy;
        self
    }

    /// Declare per-channel defaults for empty inputs
    pub fn with_defaults(mut self, defaults: Vec<Option<NestedValue>>) -> Self {
        self.defaults = defaults;
        self
    }

    fn policy_at(&self, level: usize) -> Alignment {
        self.level_policies
            .get(level)
            .copied()
            .unwrap_or(self.policy)
    }
}

/// Align `inputs` with one policy for `depth` levels
pub fn broadcast(inputs: Vec<NestedValue>, policy: Alignment, depth: usize) -> Vec<NestedValue> {
    broadcast_with(inputs, &BroadcastOptions::new(policy, depth))
}

/// Align `inputs` according to `options`
///
/// An empty channel with a declared default becomes a one-element list of
/// that default before alignment. An empty channel without a default stays
/// empty and does not take part in the length calculation.
pub fn broadcast_with(inputs: Vec<NestedValue>, options: &BroadcastOptions) -> Vec<NestedValue> {
    let mut channels: Vec<NestedValue> = inputs
        .into_iter()
        .enumerate()
        .map(|(i, value)| match options.defaults.get(i) {
            Some(Some(default)) if value.is_empty() => NestedValue::List(vec![default.clone()]),
            _ => value,
        })
        .collect();

    align_channels(&mut channels, options, 0);
    channels
}

fn align_channels(channels: &mut [NestedValue], options: &BroadcastOptions, level: usize) {
    if level >= options.depth {
        return;
    }
    // Leaves act as a single element at this level
    for channel in channels.iter_mut() {
        if channel.is_leaf() {
            let leaf = std::mem::take(channel);
            *channel = NestedValue::List(vec![leaf]);
        }
    }

    let mut lists: Vec<Vec<NestedValue>> = channels
        .iter_mut()
        .map(|c| std::mem::take(c).into_list())
        .collect();
    let target = match_lengths(&mut lists, options.policy_at(level));

    if level + 1 < options.depth {
        for index in 0..target {
            let mut column: Vec<NestedValue> = lists
                .iter_mut()
                .filter_map(|list| list.get_mut(index).map(std::mem::take))
                .collect();
            align_channels(&mut column, options, level + 1);

            let mut column = column.into_iter();
            for list in lists.iter_mut() {
                if let Some(slot) = list.get_mut(index) {
                    if let Some(aligned) = column.next() {
                        *slot = aligned;
                    }
                }
            }
        }
    }

    for (channel, list) in channels.iter_mut().zip(lists) {
        *channel = NestedValue::List(list);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lens(values: &[NestedValue]) -> Vec<usize> {
        values.iter().map(NestedValue::len).collect()
    }

    fn floats(value: &NestedValue) -> Vec<f64> {
        value.flatten_f64()
    }

    #[test]
    fn test_full_list_repeats_last() {
        let inputs = vec![
            NestedValue::from(vec![1.0, 2.0, 3.0]),
            NestedValue::from(vec![9.0]),
            NestedValue::from(vec![1.0, 2.0, 3.0, 4.0, 5.0]),
        ];
        let out = broadcast(inputs, Alignment::RepeatLast, 1);

        assert_eq!(lens(&out), vec![5, 5, 5]);
        assert_eq!(floats(&out[0]), vec![1.0, 2.0, 3.0, 3.0, 3.0]);
        assert_eq!(floats(&out[1]), vec![9.0; 5]);
        assert_eq!(floats(&out[2]), vec![1.0, 2.0, 3.0, 4.0, 5.0]);
    }

    #[test]
    fn test_cycle_wraps_around() {
        let inputs = vec![
            NestedValue::from(vec![1.0, 2.0]),
            NestedValue::from(vec![0.0; 5]),
        ];
        let out = broadcast(inputs, Alignment::Cycle, 1);

        assert_eq!(lens(&out), vec![5, 5]);
        assert_eq!(floats(&out[0]), vec![1.0, 2.0, 1.0, 2.0, 1.0]);
    }

    #[test]
    fn test_nested_levels_align_per_object() {
        // Two objects on X, one on Y; inner lengths differ per object
        let x = NestedValue::from(vec![vec![1.0, 2.0, 3.0], vec![4.0]]);
        let y = NestedValue::from(vec![vec![10.0]]);
        let out = broadcast(vec![x, y], Alignment::RepeatLast, 2);

        assert_eq!(out[0], NestedValue::from(vec![vec![1.0, 2.0, 3.0], vec![4.0]]));
        assert_eq!(
            out[1],
            NestedValue::from(vec![vec![10.0, 10.0, 10.0], vec![10.0]])
        );
    }

    #[test]
    fn test_level_policy_override() {
        let a = NestedValue::from(vec![vec![1.0, 2.0], vec![3.0]]);
        let b = NestedValue::from(vec![vec![5.0], vec![6.0], vec![7.0], vec![8.0]]);
        let options = BroadcastOptions::new(Alignment::RepeatLast, 2).at_level(0, Alignment::Cycle);
        let out = broadcast_with(vec![a, b], &options);

        // Objects cycle: [o0, o1, o0, o1]; elements repeat last
        assert_eq!(
            out[0],
            NestedValue::from(vec![vec![1.0, 2.0], vec![3.0], vec![1.0, 2.0], vec![3.0]])
        );
        assert_eq!(
            out[1],
            NestedValue::from(vec![vec![5.0, 5.0], vec![6.0], vec![7.0, 7.0], vec![8.0]])
        );
    }

    #[test]
    fn test_empty_channel_uses_default() {
        let options = BroadcastOptions::new(Alignment::RepeatLast, 1)
            .with_defaults(vec![None, Some(NestedValue::Float(0.0))]);
        let out = broadcast_with(
            vec![NestedValue::from(vec![1.0, 2.0]), NestedValue::empty()],
            &options,
        );
        assert_eq!(floats(&out[1]), vec![0.0, 0.0]);
    }

    #[test]
    fn test_empty_channel_without_default_stays_empty() {
        let out = broadcast(
            vec![NestedValue::from(vec![1.0, 2.0, 3.0]), NestedValue::empty()],
            Alignment::Cycle,
            2,
        );
        assert_eq!(out[0].len(), 3);
        assert!(out[1].is_empty());
    }

    #[test]
    fn test_leaf_input_broadcasts_as_single_element() {
        let out = broadcast(
            vec![NestedValue::Float(2.0), NestedValue::from(vec![1.0, 1.0, 1.0])],
            Alignment::RepeatLast,
            1,
        );
        assert_eq!(floats(&out[0]), vec![2.0, 2.0, 2.0]);
    }

    #[test]
    fn test_broadcast_is_deterministic() {
        let make = || {
            vec![
                NestedValue::from(vec![vec![1.0], vec![2.0, 3.0]]),
                NestedValue::from(vec![vec![4.0, 5.0, 6.0]]),
                NestedValue::from(vec![vec![7.0], vec![8.0], vec![9.0]]),
            ]
        };
        let first = broadcast(make(), Alignment::Cycle, 2);
        let second = broadcast(make(), Alignment::Cycle, 2);
        assert_eq!(first, second);
    }

    #[test]
    fn test_match_lengths_never_truncates() {
        let mut lists = vec![vec![1, 2, 3, 4], vec![5, 6]];
        let target = match_lengths(&mut lists, Alignment::Cycle);
        assert_eq!(target, 4);
        assert_eq!(lists[0], vec![1, 2, 3, 4]);
        assert_eq!(lists[1], vec![5, 6, 5, 6]);
    }
}
