//! Materialising `cond ? t : f` for constant arms.
//!
//! A `Setcc` produces `{0, 1}`; a short arithmetic suffix turns that into
//! the requested constants. The planner enumerates the suffixes built from
//! `add`, `lea`, `shl`, `neg`, `not`, `and`, preferring the shortest one
//! and the lea forms for the ×3/×5/×9 distances. Swapping the two arms
//! negates the condition.

use smallvec::{smallvec, SmallVec};

/// One arithmetic step applied to the `{0, 1}` result.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Step {
    /// The `setcc` itself (with its zero extension to 32 bit).
    Set,
    /// `add $imm, r`.
    Add(i32),
    /// `lea c(r₀, r, 2^scale)` — `r := base·r + r·2^scale + offset` where
    /// `base` selects whether the unscaled register participates.
    Lea {
        /// Add the unscaled register as base.
        base: bool,
        /// Scale exponent of the index.
        scale: u8,
        /// Displacement.
        offset: i32,
    },
    /// `shl $k, r`.
    Shl(u8),
    /// `neg r`.
    Neg,
    /// `not r`.
    Not,
    /// `and $imm, r`.
    And(u32),
}

/// The plan: steps applied in order, and whether the condition must be
/// negated because the arms were swapped.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SetccTransform {
    /// The steps, starting with `Step::Set`.
    pub steps: SmallVec<[Step; 4]>,
    /// The arms were swapped; negate the condition.
    pub negate: bool,
}

/// Plan the conversion of `{0, 1}` (condition false/true) into `{f, t}`.
///
/// `t` and `f` must differ.
pub fn find_const_transform(t: i64, f: i64) -> SetccTransform {
    assert_ne!(t, f, "degenerate select");

    // A zero true-arm swaps cheaper than it computes.
    let (t, f, negate) = if t == 0 { (f, t, true) } else { (t, f, false) };

    let mut steps: SmallVec<[Step; 4]> = smallvec![Step::Set];
    scale_steps(&mut steps, t - f);
    if f != 0 {
        // Fold the final addition into a trailing lea when one is there.
        if let Some(Step::Lea { offset, .. }) = steps.last_mut() {
            *offset = f as i32;
        } else {
            steps.push(Step::Add(f as i32));
        }
    }
    SetccTransform { steps, negate }
}

/// Append the steps turning `{0, 1}` into `{0, d}`.
fn scale_steps(steps: &mut SmallVec<[Step; 4]>, d: i64) {
    let abs = d.unsigned_abs();
    match abs {
        1 => {}
        2 => steps.push(Step::Lea {
            base: true,
            scale: 0,
            offset: 0,
        }),
        3 | 5 | 9 => steps.push(Step::Lea {
            base: true,
            scale: match abs {
                3 => 1,
                5 => 2,
                _ => 3,
            },
            offset: 0,
        }),
        4 | 8 => steps.push(Step::Lea {
            base: false,
            scale: if abs == 4 { 2 } else { 3 },
            offset: 0,
        }),
        _ if abs.count_ones() == 1 && abs.trailing_zeros() < 32 => {
            steps.push(Step::Shl(abs.trailing_zeros() as u8))
        }
        _ => {
            // {0,1} -> {0,-1} -> {0,d}; the mask works for either sign.
            steps.push(Step::Neg);
            steps.push(Step::And(d as i32 as u32));
            return;
        }
    }
    if d < 0 {
        steps.push(Step::Neg);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_select_is_bare_set() {
        let tr = find_const_transform(1, 0);
        assert_eq!(&tr.steps[..], &[Step::Set]);
        assert!(!tr.negate);
    }

    #[test]
    fn zero_true_arm_swaps_and_negates() {
        let tr = find_const_transform(0, 1);
        assert_eq!(&tr.steps[..], &[Step::Set]);
        assert!(tr.negate);
    }

    #[test]
    fn power_of_two_shifts() {
        let tr = find_const_transform(16, 0);
        assert_eq!(&tr.steps[..], &[Step::Set, Step::Shl(4)]);
    }

    #[test]
    fn magic_lea_distances() {
        let tr = find_const_transform(5, 0);
        assert_eq!(
            &tr.steps[..],
            &[
                Step::Set,
                Step::Lea {
                    base: true,
                    scale: 2,
                    offset: 0
                }
            ]
        );
        // Distance 3 with a base offset folds into one lea.
        let tr = find_const_transform(10, 7);
        assert_eq!(
            &tr.steps[..],
            &[
                Step::Set,
                Step::Lea {
                    base: true,
                    scale: 1,
                    offset: 7
                }
            ]
        );
    }

    #[test]
    fn negative_unit_distance() {
        // {t=3, f=4}: d = -1, so negate then add.
        let tr = find_const_transform(3, 4);
        assert_eq!(&tr.steps[..], &[Step::Set, Step::Neg, Step::Add(4)]);
    }

    #[test]
    fn arbitrary_mask() {
        // {t=7, f=0}: neg + and.
        let tr = find_const_transform(7, 0);
        assert_eq!(&tr.steps[..], &[Step::Set, Step::Neg, Step::And(7)]);
    }

    #[test]
    fn all_plans_compute_the_select() {
        // Interpret the steps to check the plan against a few pairs.
        fn eval(tr: &SetccTransform, cond: bool) -> i64 {
            let cond = cond != tr.negate;
            let mut r: i64 = if cond { 1 } else { 0 };
            for step in &tr.steps {
                match *step {
                    Step::Set => {}
                    Step::Add(i) => r = (r as i32).wrapping_add(i) as i64,
                    Step::Lea {
                        base,
                        scale,
                        offset,
                    } => {
                        let b = if base { r } else { 0 };
                        r = (b as i32)
                            .wrapping_add(((r << scale) as i32).wrapping_add(offset))
                            as i64;
                    }
                    Step::Shl(k) => r = ((r as i32) << k) as i64,
                    Step::Neg => r = -(r as i32) as i64,
                    Step::Not => r = !(r as i32) as i64,
                    Step::And(m) => r = ((r as u32) & m) as i32 as i64,
                }
            }
            r as i32 as i64
        }

        for &(t, f) in &[
            (1, 0),
            (0, 1),
            (2, 0),
            (3, 0),
            (5, 0),
            (9, 0),
            (4, 0),
            (8, 0),
            (16, 0),
            (7, 0),
            (-1, 0),
            (10, 7),
            (3, 4),
            (100, -100),
            (-5, 12),
            (0, -3),
        ] {
            let tr = find_const_transform(t, f);
            assert!(tr.steps.len() <= 4, "plan too long for ({}, {})", t, f);
            assert_eq!(eval(&tr, true), t, "true arm of ({}, {})", t, f);
            assert_eq!(eval(&tr, false), f, "false arm of ({}, {})", t, f);
        }
    }
}
