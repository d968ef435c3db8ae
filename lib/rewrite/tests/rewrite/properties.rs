use crate::{rewrite_in, rewrite_sql};
use insta::assert_snapshot;
use requel_model::{AstBuilder, ExprOp, JoinType, NodeArena, NodeId};
use requel_rewrite::RewriterOptions;

fn rewrite_twice_stays_fixed(mut arena: NodeArena, root: NodeId) {
    let (root, _) = rewrite_in(&mut arena, root, RewriterOptions::default());
    let once = arena.sql(root);
    let (root, _) = rewrite_in(&mut arena, root, RewriterOptions::default());
    assert_eq!(arena.sql(root), once);
}

#[test]
fn range_rewrites_are_idempotent() {
    let mut b = AstBuilder::new();
    let t = b.class_spec("t", "t");
    let a_col = b.name(t, "a");
    let a1 = b.name(t, "a");
    let ten = b.int(10);
    let p1 = b.ge(a1, ten);
    let a2 = b.name(t, "a");
    let twenty = b.int(20);
    let p2 = b.le(a2, twenty);
    let a3 = b.name(t, "a");
    let fifteen = b.int(15);
    let p3 = b.gt(a3, fifteen);
    let select = b
        .select()
        .column(a_col)
        .from(t)
        .predicate(p1)
        .predicate(p2)
        .predicate(p3)
        .build(&mut b);
    rewrite_twice_stays_fixed(b.into_arena(), select);
}

#[test]
fn join_rewrites_are_idempotent() {
    let mut b = AstBuilder::new();
    let s = b.class_spec("p", "s");
    let t = b.class_spec("p", "t");
    let name_col = b.name(s, "name");
    let spouse = b.name(s, "spouse");
    let oid = b.oid_name(t);
    let on = b.eq(spouse, oid);
    let sex = b.name(t, "sex");
    let one = b.int(1);
    let pred = b.eq(sex, one);
    let select = b
        .select()
        .column(name_col)
        .from(s)
        .join(JoinType::LeftOuter, t, vec![on])
        .predicate(pred)
        .build(&mut b);
    rewrite_twice_stays_fixed(b.into_arena(), select);
}

#[test]
fn where_is_in_conjunctive_normal_form_after_rewrite() {
    let mut b = AstBuilder::new();
    let t = b.class_spec("t", "t");
    let a_col = b.name(t, "a");
    let a1 = b.name(t, "a");
    let one = b.int(1);
    let p1 = b.eq(a1, one);
    let b1 = b.name(t, "b");
    let two = b.int(2);
    let p2 = b.eq(b1, two);
    let c1 = b.name(t, "c");
    let three = b.int(3);
    let p3 = b.eq(c1, three);
    let and = b.and(p1, p2);
    let or = b.or(and, p3);
    let select = b
        .select()
        .column(a_col)
        .from(t)
        .predicate(or)
        .build(&mut b);

    let mut arena = b.into_arena();
    let (root, _) = rewrite_in(&mut arena, select, RewriterOptions::default());

    let where_head = arena[root].as_select().unwrap().where_clause;
    for conjunct in arena.list(where_head) {
        for disjunct in arena.or_list(Some(conjunct)) {
            let op = arena[disjunct].expr_op();
            assert_ne!(op, Some(ExprOp::And), "AND at conjunct level");
            assert_ne!(op, Some(ExprOp::Or), "OR inside a disjunct chain");
        }
    }
    assert_snapshot!(
        arena.sql(root),
        @"SELECT t.a FROM t WHERE (t.a = 1 OR t.c = 3) AND (t.b = 2 OR t.c = 3)"
    );
}

#[test]
fn on_conditions_round_trip_through_the_location_tags() {
    let mut b = AstBuilder::new();
    let t = b.class_spec("t", "t");
    let u = b.class_spec("u", "u");
    let a_col = b.name(t, "a");
    let ta = b.name(t, "a");
    let ub = b.name(u, "b");
    let on1 = b.eq(ub, ta);
    let uc = b.name(u, "c");
    let one = b.int(1);
    let on2 = b.gt(uc, one);
    let ta2 = b.name(t, "a");
    let five = b.int(5);
    let where_pred = b.gt(ta2, five);
    let select = b
        .select()
        .column(a_col)
        .from(t)
        .join(JoinType::LeftOuter, u, vec![on1, on2])
        .predicate(where_pred)
        .build(&mut b);

    // The WHERE only references the left side, so the join stays outer
    // and both ON conjuncts must come back.
    assert_snapshot!(
        rewrite_sql(b, select),
        @"SELECT t.a FROM t LEFT OUTER JOIN u ON u.b = t.a AND u.c > 1 WHERE t.a > 5"
    );
}

#[test]
fn update_and_delete_search_conditions_are_simplified() {
    let mut b = AstBuilder::new();
    let t = b.class_spec("t", "t");
    let a1 = b.name(t, "a");
    let five = b.int(5);
    let p1 = b.eq(a1, five);
    let a2 = b.name(t, "a");
    let six = b.int(6);
    let p2 = b.eq(a2, six);
    let delete = b.delete(t, vec![p1, p2]);

    let mut arena = b.into_arena();
    let (root, _) = rewrite_in(&mut arena, delete, RewriterOptions::default());
    assert_snapshot!(arena.sql(root), @"DELETE FROM t WHERE FALSE");
}

#[test]
fn set_operation_arms_are_rewritten_independently() {
    let mut b = AstBuilder::new();
    let t = b.class_spec("t", "t");
    let ta = b.name(t, "a");
    let t1 = b.name(t, "a");
    let ten = b.int(10);
    let p1 = b.ge(t1, ten);
    let t2 = b.name(t, "a");
    let twenty = b.int(20);
    let p2 = b.le(t2, twenty);
    let left = b
        .select()
        .column(ta)
        .from(t)
        .predicate(p1)
        .predicate(p2)
        .build(&mut b);

    let u = b.class_spec("u", "u");
    let ub = b.name(u, "b");
    let u1 = b.name(u, "b");
    let five = b.int(5);
    let p3 = b.eq(u1, five);
    let right = b.select().column(ub).from(u).predicate(p3).build(&mut b);

    let union = b.union(left, right, false);
    let mut arena = b.into_arena();
    let (root, _) = rewrite_in(&mut arena, union, RewriterOptions::default());
    assert_snapshot!(
        arena.sql(root),
        @"(SELECT t.a FROM t WHERE t.a RANGE(10 GE_LE 20)) UNION (SELECT 5 FROM u WHERE u.b = 5)"
    );
}
