//! `BestIndex` planning (spec §4.5/§4.8), kept free of any SQLite types so
//! it can be unit tested directly. [`vt::mod`](super) adapts
//! `rusqlite::vtab::IndexInfo` into the [`RawConstraint`]/[`RawOrderBy`]
//! inputs this module consumes and writes an [`IndexPlan`] back out.

use serde::{Deserialize, Serialize};

use crate::adapter::{OrderSpec, RequestedOrder};
use crate::fields::{Field, Order};
use crate::filters::{Filter, Operator};
use crate::row::Bounds;
use crate::value::NativeValue;

/// The comparison a pushed-down constraint represents. `Limit`/`Offset`
/// are SQLite's synthetic constraints for `LIMIT`/`OFFSET`, surfaced
/// with the sentinel column index `-1` just like a rowid constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintOp {
    Eq,
    NotEq,
    Gt,
    Ge,
    Lt,
    Le,
    Like,
    IsNull,
    IsNotNull,
    Limit,
    Offset,
    /// Anything this bridge doesn't push down (`GLOB`, `MATCH`, `REGEXP`,
    /// ...). Always left for the engine to re-check.
    Unsupported,
}

#[derive(Debug, Clone, Copy)]
pub struct RawConstraint {
    pub column: i32,
    pub op: ConstraintOp,
    pub usable: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct RawOrderBy {
    pub column: i32,
    pub desc: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct ArgvUsage {
    /// 1-based SQLite argv slot, or `None` if this constraint isn't used.
    pub argv_index: Option<i32>,
    pub omit: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct WireConstraint {
    pub column: i32,
    pub op: WireOp,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub(crate) enum WireOp {
    Eq,
    NotEq,
    Gt,
    Ge,
    Lt,
    Le,
    Like,
    IsNull,
    IsNotNull,
    Limit,
    Offset,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct WireOrderBy {
    pub column: i32,
    pub desc: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub(crate) struct WirePlan {
    /// Ordered by argv index (argv\[0\] is `constraints[0]`, ...).
    pub constraints: Vec<WireConstraint>,
    /// Only populated when `order_by_consumed` was true, so `xFilter`
    /// knows which order to hand the adapter.
    pub order_by: Vec<WireOrderBy>,
}

#[derive(Debug, Clone)]
pub struct IndexPlan {
    pub idx_str: String,
    pub argv_usage: Vec<ArgvUsage>,
    pub order_by_consumed: bool,
    /// The order this plan accepted, in the form `Adapter::get_cost`
    /// expects, so the caller can report a cost that reflects what was
    /// actually pushed down rather than an empty placeholder (spec
    /// §4.3/§4.5: cost is computed from the accepted ops).
    pub accepted_order: Vec<OrderSpec>,
    /// Names of columns that received at least one pushed-down
    /// constraint, for the same reason.
    pub accepted_columns: Vec<String>,
}

fn op_to_wire(op: ConstraintOp) -> Option<WireOp> {
    match op {
        ConstraintOp::Eq => Some(WireOp::Eq),
        ConstraintOp::NotEq => Some(WireOp::NotEq),
        ConstraintOp::Gt => Some(WireOp::Gt),
        ConstraintOp::Ge => Some(WireOp::Ge),
        ConstraintOp::Lt => Some(WireOp::Lt),
        ConstraintOp::Le => Some(WireOp::Le),
        ConstraintOp::Like => Some(WireOp::Like),
        ConstraintOp::IsNull => Some(WireOp::IsNull),
        ConstraintOp::IsNotNull => Some(WireOp::IsNotNull),
        ConstraintOp::Limit => Some(WireOp::Limit),
        ConstraintOp::Offset => Some(WireOp::Offset),
        ConstraintOp::Unsupported => None,
    }
}

fn filter_tag_for(op: ConstraintOp) -> Option<&'static str> {
    match op {
        ConstraintOp::Eq => Some("Equal"),
        ConstraintOp::NotEq => Some("NotEqual"),
        ConstraintOp::Gt | ConstraintOp::Ge | ConstraintOp::Lt | ConstraintOp::Le => Some("Range"),
        ConstraintOp::Like => Some("Like"),
        ConstraintOp::IsNull => Some("IsNull"),
        ConstraintOp::IsNotNull => Some("IsNotNull"),
        _ => None,
    }
}

/// Decide which constraints to accept, which to let SQLite re-check
/// itself, and whether a requested ordering can be fully satisfied by
/// the adapter, given the adapter's declared per-column capabilities.
pub fn plan_index(
    columns: &[(String, Box<dyn Field>)],
    constraints: &[RawConstraint],
    order_by: &[RawOrderBy],
) -> crate::error::Result<IndexPlan> {
    let mut argv_usage = vec![ArgvUsage { argv_index: None, omit: false }; constraints.len()];
    let mut wire_constraints = Vec::new();
    let mut next_argv = 1;
    let mut limit_used = false;
    let mut offset_used = false;

    for (i, constraint) in constraints.iter().enumerate() {
        if !constraint.usable {
            continue;
        }

        if constraint.op == ConstraintOp::Limit {
            if !limit_used {
                limit_used = true;
                wire_constraints.push(WireConstraint { column: -1, op: WireOp::Limit });
                argv_usage[i] = ArgvUsage {
                    argv_index: Some(next_argv),
                    omit: false,
                };
                next_argv += 1;
            }
            continue;
        }
        if constraint.op == ConstraintOp::Offset {
            if !offset_used {
                offset_used = true;
                wire_constraints.push(WireConstraint { column: -1, op: WireOp::Offset });
                argv_usage[i] = ArgvUsage {
                    argv_index: Some(next_argv),
                    omit: false,
                };
                next_argv += 1;
            }
            continue;
        }

        let Some(tag) = filter_tag_for(constraint.op) else {
            continue;
        };
        let field = match columns.get(constraint.column as usize) {
            Some((_, field)) if constraint.column >= 0 => field,
            _ => continue,
        };
        if !field.filters().contains(&tag) {
            continue;
        }

        let Some(wire_op) = op_to_wire(constraint.op) else {
            continue;
        };
        wire_constraints.push(WireConstraint {
            column: constraint.column,
            op: wire_op,
        });
        argv_usage[i] = ArgvUsage {
            argv_index: Some(next_argv),
            omit: field.exact(),
        };
        next_argv += 1;
    }

    let order_by_consumed = !order_by.is_empty()
        && order_by.iter().all(|ob| {
            columns
                .get(ob.column as usize)
                .map(|(_, field)| match field.order() {
                    Order::Any => true,
                    Order::Ascending => !ob.desc,
                    Order::Descending => ob.desc,
                    Order::None => false,
                })
                .unwrap_or(false)
        });

    let wire_order_by = if order_by_consumed {
        order_by
            .iter()
            .map(|ob| WireOrderBy {
                column: ob.column,
                desc: ob.desc,
            })
            .collect()
    } else {
        Vec::new()
    };

    let accepted_order: Vec<OrderSpec> = if order_by_consumed {
        order_by
            .iter()
            .filter_map(|ob| {
                columns.get(ob.column as usize).map(|(name, _)| OrderSpec {
                    column: name.clone(),
                    direction: if ob.desc {
                        RequestedOrder::Descending
                    } else {
                        RequestedOrder::Ascending
                    },
                })
            })
            .collect()
    } else {
        Vec::new()
    };

    let accepted_columns: Vec<String> = wire_constraints
        .iter()
        .filter(|c| c.column >= 0)
        .filter_map(|c| columns.get(c.column as usize).map(|(name, _)| name.clone()))
        .collect();

    let plan = WirePlan {
        constraints: wire_constraints,
        order_by: wire_order_by,
    };
    let idx_str = serde_json::to_string(&plan)?;

    Ok(IndexPlan {
        idx_str,
        argv_usage,
        order_by_consumed,
        accepted_order,
        accepted_columns,
    })
}

/// The cost heuristic shared with [`plan_index`]'s callers (spec §4.3:
/// "zero-cost with no predicates ... +10x rows per requested sort key").
/// Collapsed here to a single curve driven by the adapter's own row-count
/// estimate, which already reflects how many of the accepted predicates
/// and sort keys it expects to be able to use.
pub fn estimate_cost(estimated_rows: Option<u64>) -> f64 {
    match estimated_rows {
        Some(rows) => (rows.max(1) as f64).log2() * 10.0,
        None => 1_000_000.0,
    }
}

/// Decode the `idx_str` this module wrote, together with the bound
/// `argv` values from `xFilter`, back into a [`Bounds`] map plus the
/// `LIMIT`/`OFFSET` values if present. Used by `AdapterVTabCursor::filter`.
pub fn decode_plan(
    idx_str: &str,
    columns: &[(String, Box<dyn Field>)],
    argv: &[crate::value::EngineValue],
) -> crate::error::Result<(Bounds, Vec<OrderSpec>, Option<u64>, Option<u64>)> {
    let plan: WirePlan = if idx_str.is_empty() {
        WirePlan::default()
    } else {
        serde_json::from_str(idx_str)?
    };

    let order: Vec<OrderSpec> = plan
        .order_by
        .iter()
        .filter_map(|ob| {
            columns.get(ob.column as usize).map(|(name, _)| OrderSpec {
                column: name.clone(),
                direction: if ob.desc {
                    RequestedOrder::Descending
                } else {
                    RequestedOrder::Ascending
                },
            })
        })
        .collect();

    let mut bounds: Bounds = Bounds::new();
    let mut limit = None;
    let mut offset = None;

    for (slot, constraint) in plan.constraints.iter().enumerate() {
        let Some(raw_value) = argv.get(slot) else {
            continue;
        };

        match constraint.op {
            WireOp::Limit => {
                limit = Some(raw_value.as_integer()? as u64);
                continue;
            }
            WireOp::Offset => {
                offset = Some(raw_value.as_integer()? as u64);
                continue;
            }
            _ => {}
        }

        let Some((name, field)) = columns.get(constraint.column as usize) else {
            continue;
        };
        let native = field.parse(raw_value)?;

        let new_filter = match constraint.op {
            WireOp::Eq => Filter::Equal(native),
            WireOp::NotEq => Filter::NotEqual(native),
            WireOp::Gt => Filter::build([(Operator::Gt, native)]),
            WireOp::Ge => Filter::build([(Operator::Ge, native)]),
            WireOp::Lt => Filter::build([(Operator::Lt, native)]),
            WireOp::Le => Filter::build([(Operator::Le, native)]),
            WireOp::Like => match native {
                NativeValue::String(s) => Filter::Like(s),
                _ => continue,
            },
            WireOp::IsNull => Filter::IsNull,
            WireOp::IsNotNull => Filter::IsNotNull,
            WireOp::Limit | WireOp::Offset => unreachable!(),
        };

        bounds
            .entry(name.clone())
            .and_modify(|existing| *existing = existing.intersect(&new_filter))
            .or_insert(new_filter);
    }

    Ok((bounds, order, limit, offset))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::{FieldConfig, IntegerField};

    fn columns() -> Vec<(String, Box<dyn Field>)> {
        vec![(
            "age".to_string(),
            Box::new(IntegerField::new(
                FieldConfig::default().with_filters(vec!["Range"]).with_exact(true),
            )),
        )]
    }

    #[test]
    fn range_constraint_is_accepted_and_omitted_when_exact() {
        let columns = columns();
        let constraints = vec![RawConstraint {
            column: 0,
            op: ConstraintOp::Gt,
            usable: true,
        }];
        let plan = plan_index(&columns, &constraints, &[]).unwrap();
        assert!(plan.argv_usage[0].argv_index.is_some());
        assert!(plan.argv_usage[0].omit);
    }

    #[test]
    fn unsupported_filter_tag_is_not_pushed_down() {
        let columns = vec![(
            "age".to_string(),
            Box::new(IntegerField::new(FieldConfig::default())) as Box<dyn Field>,
        )];
        let constraints = vec![RawConstraint {
            column: 0,
            op: ConstraintOp::Eq,
            usable: true,
        }];
        let plan = plan_index(&columns, &constraints, &[]).unwrap();
        assert!(plan.argv_usage[0].argv_index.is_none());
    }

    #[test]
    fn order_by_consumed_only_when_field_supports_direction() {
        let columns = vec![(
            "age".to_string(),
            Box::new(IntegerField::new(
                FieldConfig::default().with_order(Order::Ascending),
            )) as Box<dyn Field>,
        )];
        let ascending = plan_index(
            &columns,
            &[],
            &[RawOrderBy { column: 0, desc: false }],
        )
        .unwrap();
        assert!(ascending.order_by_consumed);
        assert_eq!(ascending.accepted_order.len(), 1);

        let descending = plan_index(
            &columns,
            &[],
            &[RawOrderBy { column: 0, desc: true }],
        )
        .unwrap();
        assert!(!descending.order_by_consumed);
        assert!(descending.accepted_order.is_empty());
    }

    #[test]
    fn decode_plan_round_trips_range_bound() {
        let columns = columns();
        let constraints = vec![RawConstraint {
            column: 0,
            op: ConstraintOp::Gt,
            usable: true,
        }];
        let plan = plan_index(&columns, &constraints, &[]).unwrap();
        assert!(plan.idx_str.starts_with('{'), "idx_str must be JSON, got {}", plan.idx_str);
        assert_eq!(plan.accepted_columns, vec!["age".to_string()]);

        let argv = vec![crate::value::EngineValue::Integer(21)];
        let (bounds, order, limit, offset) = decode_plan(&plan.idx_str, &columns, &argv).unwrap();
        assert_eq!(limit, None);
        assert_eq!(offset, None);
        assert!(order.is_empty());
        assert_eq!(
            bounds.get("age"),
            Some(&Filter::Range {
                start: Some(NativeValue::Integer(21)),
                end: None,
                include_start: false,
                include_end: false,
            })
        );
    }

    #[test]
    fn decode_plan_treats_empty_idx_str_as_no_constraints() {
        let columns = columns();
        let (bounds, order, limit, offset) = decode_plan("", &columns, &[]).unwrap();
        assert!(bounds.is_empty());
        assert!(order.is_empty());
        assert_eq!(limit, None);
        assert_eq!(offset, None);
    }
}
