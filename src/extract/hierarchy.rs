//! Parent/child linking by indentation.

use crate::domain::TaskRecord;

/// Link tasks into a forest by indentation.
///
/// `tasks` pairs each record with its indent width and must be in line order.
/// A task's parent is the nearest preceding task with a strictly smaller
/// indent; children are listed in line order.
pub fn build_hierarchy(tasks: &mut [(TaskRecord, usize)]) {
    // (index, indent) of the open ancestors, innermost last
    let mut stack: Vec<(usize, usize)> = Vec::new();

    for i in 0..tasks.len() {
        let indent = tasks[i].1;
        while stack.last().is_some_and(|&(_, open)| open >= indent) {
            stack.pop();
        }
        if let Some(&(parent, _)) = stack.last() {
            let child_id = tasks[i].0.id.clone();
            let parent_id = tasks[parent].0.id.clone();
            tasks[parent].0.metadata.children_ids.push(child_id);
            tasks[i].0.metadata.parent_id = Some(parent_id);
        }
        stack.push((i, indent));
    }
}
