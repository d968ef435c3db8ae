use crate::{rewrite_in, rewrite_sql};
use insta::assert_snapshot;
use requel_model::{
    AstBuilder, DataTypeDescriptor, ExprOp, FunctionKind, JoinType, SqlType, ValueData,
};
use requel_rewrite::RewriterOptions;

#[test]
fn propagated_equality_against_a_between_collapses_to_false() {
    let mut b = AstBuilder::new();
    let t = b.class_spec("t", "t");
    let a_col = b.name(t, "a");
    let b_col = b.name(t, "b");
    let a1 = b.name(t, "a");
    let five = b.int(5);
    let p1 = b.eq(a1, five);
    let a2 = b.name(t, "a");
    let six = b.int(6);
    let ten = b.int(10);
    let p2 = b.between(a2, six, ten);
    let select = b
        .select()
        .column(a_col)
        .column(b_col)
        .from(t)
        .predicate(p1)
        .predicate(p2)
        .build(&mut b);

    assert_snapshot!(rewrite_sql(b, select), @"SELECT 5, t.b FROM t WHERE FALSE");
}

#[test]
fn like_prefix_becomes_a_range_and_the_redundant_null_test_folds() {
    let mut b = AstBuilder::new();
    let t = b.class_spec("t", "t");
    let varchar = Some(DataTypeDescriptor::precision(16));
    let a_col = b.typed_name(t, "a", SqlType::VarChar, varchar);
    let a1 = b.typed_name(t, "a", SqlType::VarChar, varchar);
    let p1 = b.like(a1, "abc%");
    let a2 = b.typed_name(t, "a", SqlType::VarChar, varchar);
    let p2 = b.like(a2, "%");
    let select = b
        .select()
        .column(a_col)
        .from(t)
        .predicate(p1)
        .predicate(p2)
        .build(&mut b);

    assert_snapshot!(
        rewrite_sql(b, select),
        @"SELECT t.a FROM t WHERE t.a RANGE('abc' GE_LT 'abd')"
    );
}

#[test]
fn outer_join_strengthens_and_its_on_condition_lands_in_where() {
    let mut b = AstBuilder::new();
    let s = b.class_spec("p", "s");
    let t = b.class_spec("p", "t");
    let name_col = b.typed_name(s, "name", SqlType::VarChar, None);
    let spouse = b.typed_name(s, "spouse", SqlType::Object, None);
    let oid = b.oid_name(t);
    let on = b.eq(spouse, oid);
    let sex = b.typed_name(t, "sex", SqlType::Char, Some(DataTypeDescriptor::precision(1)));
    let f = b.string("F");
    let pred = b.eq(sex, f);
    let select = b
        .select()
        .column(name_col)
        .from(s)
        .join(JoinType::LeftOuter, t, vec![on])
        .predicate(pred)
        .build(&mut b);

    assert_snapshot!(
        rewrite_sql(b, select),
        @"SELECT s.name FROM p s, p t WHERE t.sex = 'F' AND s.spouse = t.oid"
    );
}

#[test]
fn uncorrelated_equality_subquery_hoists_to_a_derived_table() {
    let mut b = AstBuilder::new();
    let u = b.class_spec("u", "u");
    let x = b.name(u, "x");
    let max = b.func(FunctionKind::Max, vec![x]);
    let sub = b.select().column(max).from(u).build(&mut b);
    let t = b.class_spec("t", "t");
    let a = b.name(t, "a");
    let pred = b.eq(a, sub);
    let a_col = b.name(t, "a");
    let select = b
        .select()
        .column(a_col)
        .from(t)
        .predicate(pred)
        .build(&mut b);

    assert_snapshot!(
        rewrite_sql(b, select),
        @"SELECT t.a FROM t, (SELECT MAX(u.x) FROM u) dt1 (c2) WHERE t.a = dt1.c2"
    );
}

#[test]
fn constant_order_by_items_are_removed() {
    let mut b = AstBuilder::new();
    let t = b.class_spec("t", "t");
    let a_col = b.name(t, "a");
    let b_col = b.name(t, "b");
    let a_ref = b.name(t, "a");
    let i1 = b.sort_pos(1, a_ref, true);
    let x = b.string("x");
    let i2 = b.sort(x, true);
    let b_ref = b.name(t, "b");
    let i3 = b.sort_pos(2, b_ref, true);
    let select = b
        .select()
        .column(a_col)
        .column(b_col)
        .from(t)
        .order_by(i1)
        .order_by(i2)
        .order_by(i3)
        .build(&mut b);

    assert_snapshot!(rewrite_sql(b, select), @"SELECT t.a, t.b FROM t ORDER BY 1, 2");
}

#[test]
fn overlapping_bounds_intersect_into_one_range() {
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

    assert_snapshot!(
        rewrite_sql(b, select),
        @"SELECT t.a FROM t WHERE t.a RANGE(15 GT_LE 20)"
    );
}

#[test]
fn quantified_some_uses_the_matching_extremum() {
    let mut b = AstBuilder::new();
    let u = b.class_spec("u", "u");
    let x = b.name(u, "x");
    let sub = b.select().column(x).from(u).build(&mut b);
    let t = b.class_spec("t", "t");
    let a = b.name(t, "a");
    let pred = b.some_cmp(ExprOp::Ge, a, sub);
    let a_col = b.name(t, "a");
    let select = b
        .select()
        .column(a_col)
        .from(t)
        .predicate(pred)
        .build(&mut b);

    assert_snapshot!(
        rewrite_sql(b, select),
        @"SELECT t.a FROM t, (SELECT MIN(u.x) FROM u) dt1 (c2) WHERE t.a >= dt1.c2"
    );
}

#[test]
fn auto_parameterization_collects_literals_in_visit_order() {
    let mut b = AstBuilder::new();
    let t = b.class_spec("t", "t");
    let a_col = b.name(t, "a");
    let a1 = b.name(t, "a");
    let five = b.int(5);
    let p1 = b.gt(a1, five);
    let c1 = b.typed_name(t, "c", SqlType::VarChar, None);
    let p2 = b.like(c1, "x_y");
    let select = b
        .select()
        .column(a_col)
        .from(t)
        .predicate(p1)
        .predicate(p2)
        .build(&mut b);

    let mut arena = b.into_arena();
    let (root, host_vars) = rewrite_in(
        &mut arena,
        select,
        RewriterOptions {
            auto_parameterize: true,
        },
    );
    assert_snapshot!(
        arena.sql(root),
        @"SELECT t.a FROM t WHERE t.a > ?:0 AND t.c LIKE ?:1"
    );
    assert_eq!(
        host_vars,
        vec![ValueData::Int(5), ValueData::Str("x_y".into())]
    );
}

#[test]
fn in_list_disjunction_merges_with_an_equality() {
    let mut b = AstBuilder::new();
    let t = b.class_spec("t", "t");
    let a_col = b.name(t, "a");
    let a1 = b.name(t, "a");
    let e1 = b.int(1);
    let e2 = b.int(7);
    let e3 = b.int(3);
    let p1 = b.in_set(a1, vec![e1, e2, e3]);
    let a2 = b.name(t, "a");
    let five = b.int(5);
    let p2 = b.ge(a2, five);
    let select = b
        .select()
        .column(a_col)
        .from(t)
        .predicate(p1)
        .predicate(p2)
        .build(&mut b);

    assert_snapshot!(
        rewrite_sql(b, select),
        @"SELECT t.a FROM t WHERE t.a RANGE(= 7)"
    );
}

#[test]
fn having_conjunct_without_aggregates_moves_to_where() {
    let mut b = AstBuilder::new();
    let t = b.class_spec("t", "t");
    let a_col = b.name(t, "a");
    let group_col = b.name(t, "a");
    let sum_arg = b.name(t, "b");
    let sum = b.func(FunctionKind::Sum, vec![sum_arg]);
    let hundred = b.int(100);
    let agg_pred = b.gt(sum, hundred);
    let c = b.name(t, "c");
    let two = b.int(2);
    let plain = b.eq(c, two);
    let select = b
        .select()
        .column(a_col)
        .from(t)
        .group_by(group_col)
        .having(agg_pred)
        .having(plain)
        .build(&mut b);

    assert_snapshot!(
        rewrite_sql(b, select),
        @"SELECT t.a FROM t WHERE t.c = 2 GROUP BY t.a HAVING SUM(t.b) > 100"
    );
}
