// -------------------------------------------------------------------------------------------------

/// Generates a Euclidean rhythm of length `steps` with `onsets` evenly distributed onsets,
/// rotated by `offset` steps (positive values rotate left).
///
/// `onsets >= steps` yields a pattern of onsets only, `onsets == 0` one without any onsets.
pub fn euclidean(onsets: u32, steps: u32, offset: i32) -> Vec<bool> {
    type Pattern = Vec<bool>;
    type Patterns = Vec<Pattern>;

    /// Combines front and last groups until at most one last group remains.
    fn combine_groups(mut front_groups: Patterns, mut last_groups: Patterns) -> Patterns {
        while last_groups.len() >= 2 {
            let mut new_front_groups: Patterns = Vec::with_capacity(front_groups.len());
            while !front_groups.is_empty() && !last_groups.is_empty() {
                if let (Some(mut front_last_group), Some(mut last_last_group)) =
                    (front_groups.pop(), last_groups.pop())
                {
                    front_last_group.append(&mut last_last_group);
                    new_front_groups.push(front_last_group);
                }
            }
            front_groups.append(&mut last_groups);
            last_groups = front_groups;
            front_groups = new_front_groups;
        }
        front_groups.append(&mut last_groups);
        front_groups
    }

    if onsets == 0 {
        vec![false; steps as usize]
    } else if onsets >= steps {
        vec![true; steps as usize]
    } else {
        let front_groups = vec![vec![true]; onsets as usize];
        let last_groups = vec![vec![false]; (steps - onsets) as usize];

        let mut rhythm: Pattern = combine_groups(front_groups, last_groups)
            .into_iter()
            .flatten()
            .collect();

        match offset {
            n if n > 0 => rhythm.rotate_left((n as usize) % (steps as usize)),
            n if n < 0 => rhythm.rotate_right((n.unsigned_abs() as usize) % (steps as usize)),
            _ => (),
        }

        rhythm
    }
}

// --------------------------------------------------------------------------------------------------
