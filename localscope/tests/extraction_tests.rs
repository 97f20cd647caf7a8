//! Scope extraction over nested code objects.

use localscope::{AccessKind, ExtractError, extract};
use localscope_bytecode::{CodeFlags, CodeObject, FunctionBuilder, Instruction, Register, disassemble};
use std::sync::Arc;

/// `[<body> for _ in .0]` nested in `parent`; `body` leaves its result in the
/// item register.
fn list_comprehension(
    parent: &FunctionBuilder,
    body: impl FnOnce(&mut FunctionBuilder, Register),
) -> Arc<CodeObject> {
    let mut comp = FunctionBuilder::nested(parent, "<listcomp>");
    comp.add_flags(CodeFlags::COMPREHENSION);
    comp.set_arg_count(1);
    let iter = comp.define_local(".0");
    let result = comp.alloc_register();
    let item = comp.alloc_register();
    let top = comp.create_label();
    let done = comp.create_label();
    comp.emit_build_list(result, result, 0);
    comp.emit_load_local(item, iter);
    comp.bind_label(top);
    comp.emit_for_iter(item, done);
    body(&mut comp, item);
    comp.emit_list_append(result, item);
    comp.emit_jump(top);
    comp.bind_label(done);
    comp.emit_return(result);
    Arc::new(comp.finish().expect("comprehension"))
}

fn function(name: &str) -> FunctionBuilder {
    let mut builder = FunctionBuilder::new(name);
    builder.set_filename("extract.py");
    builder
}

// =============================================================================
// Soundness
// =============================================================================

#[test]
fn test_every_branch_is_reported() {
    // def pick(flag):
    //     if flag:
    //         return left
    //     return right
    let mut f = function("pick");
    f.set_arg_count(1);
    let flag = f.define_local("flag");
    let left = f.add_name("left");
    let right = f.add_name("right");
    let r0 = f.alloc_register();
    let otherwise = f.create_label();
    f.set_line(2);
    f.emit_load_local(r0, flag);
    f.emit_jump_if_false(r0, otherwise);
    f.set_line(3);
    f.emit_load_global(r0, left);
    f.emit_return(r0);
    f.bind_label(otherwise);
    f.set_line(4);
    f.emit_load_global(r0, right);
    f.emit_return(r0);
    let code = f.finish().expect("pick");

    let set = extract(&code).expect("extract");
    assert_eq!(set.names(AccessKind::Global), vec!["left", "right"]);
    assert_eq!(set.get("left", AccessKind::Global).unwrap().location.line, 3);
    assert_eq!(set.get("right", AccessKind::Global).unwrap().location.line, 4);
}

#[test]
fn test_dead_branch_is_reported() {
    // def f():
    //     if False:
    //         return ghost
    let mut f = function("f");
    let ghost = f.add_name("ghost");
    let r0 = f.alloc_register();
    let skip = f.create_label();
    f.emit(Instruction::op_d(localscope_bytecode::Opcode::LoadFalse, r0));
    f.emit_jump_if_false(r0, skip);
    f.emit_load_global(r0, ghost);
    f.emit_return(r0);
    f.bind_label(skip);
    f.emit_return_none();
    let code = f.finish().expect("f");

    assert!(extract(&code).unwrap().contains("ghost", AccessKind::Global));
}

// =============================================================================
// Scoping
// =============================================================================

#[test]
fn test_parameter_read_in_comprehension_is_not_reported() {
    // def scale_all(xs, scale):
    //     return [x * scale for x in xs]
    let mut f = function("scale_all");
    f.set_arg_count(2);
    let xs = f.define_local("xs");
    f.define_local("scale");
    f.add_cellvar("scale");
    f.set_line(2);
    let comp = list_comprehension(&f, |comp, item| {
        let scale = comp.add_freevar("scale");
        let tmp = comp.alloc_register();
        comp.emit_load_closure(tmp, scale);
        comp.emit_mul(item, item, tmp);
    });
    let comp = f.add_code_object(comp);
    let r0 = f.alloc_register();
    let r1 = f.alloc_register();
    f.emit_make_closure(r0, comp);
    f.emit_load_local(r1, xs);
    f.emit_get_iter(r1, r1);
    f.emit_call(r0, r0, 1);
    f.emit_return(r0);
    let code = f.finish().expect("scale_all");

    let set = extract(&code).expect("extract");
    assert!(set.is_empty(), "unexpected records: {set:?}");
}

#[test]
fn test_grandparent_name_in_double_comprehension_is_free() {
    // def outer():
    //     k = 1
    //     def f(xs):
    //         return [[k for _ in xs] for _ in xs]
    let mut f = function("f");
    f.set_qualname("outer.<locals>.f");
    f.set_first_lineno(3);
    f.set_arg_count(1);
    let xs = f.define_local("xs");
    f.add_freevar("k");
    f.set_line(4);
    let outer_comp = list_comprehension(&f, |comp, item| {
        comp.add_freevar("k");
        let inner = list_comprehension(comp, |inner, item| {
            let k = inner.add_freevar("k");
            inner.emit_load_closure(item, k);
        });
        let inner = comp.add_code_object(inner);
        comp.emit_make_closure(item, inner);
    });
    let outer_comp = f.add_code_object(outer_comp);
    let r0 = f.alloc_register();
    let r1 = f.alloc_register();
    f.emit_make_closure(r0, outer_comp);
    f.emit_load_local(r1, xs);
    f.emit_call(r0, r0, 1);
    f.emit_return(r0);
    let code = f.finish().expect("f");

    let set = extract(&code).expect("extract");
    assert_eq!(set.len(), 1);
    let record = set.get("k", AccessKind::Free).expect("k is free");
    assert_eq!(record.location.depth, 2);
    assert_eq!(record.location.line, 4);
    assert_eq!(
        &*record.location.qualname,
        "outer.<locals>.f.<locals>.<listcomp>.<locals>.<listcomp>"
    );
}

#[test]
fn test_enclosing_function_locals_are_bound() {
    // def make():
    //     factor = 2
    //     def scale(x):
    //         return x * factor
    //     return scale
    let mut make = function("make");
    let factor_cell = make.add_cellvar("factor");
    let r0 = make.alloc_register();
    let two = make.add_int(2);
    make.emit_load_const(r0, two);
    make.emit_store_closure(factor_cell, r0);

    let mut scale = FunctionBuilder::nested(&make, "scale");
    scale.set_arg_count(1);
    let x = scale.define_local("x");
    let factor = scale.add_freevar("factor");
    let (s0, s1) = (scale.alloc_register(), scale.alloc_register());
    scale.emit_load_local(s0, x);
    scale.emit_load_closure(s1, factor);
    scale.emit_mul(s0, s0, s1);
    scale.emit_return(s0);
    let scale = make.add_code_object(Arc::new(scale.finish().expect("scale")));
    make.emit_make_closure(r0, scale);
    make.emit_return(r0);
    let code = make.finish().expect("make");

    assert!(extract(&code).unwrap().is_empty());
}

#[test]
fn test_class_body_names_are_not_visible_to_methods() {
    // def make():
    //     class Box:
    //         size = 1
    //         doubled = size * 2
    //         def area(self):
    //             return size * size
    //     return Box
    let mut make = function("make");
    make.set_line(2);
    let mut body = FunctionBuilder::nested(&make, "Box");
    body.add_flags(CodeFlags::CLASS_BODY);
    let size = body.add_name("size");
    let doubled = body.add_name("doubled");
    let (b0, b1) = (body.alloc_register(), body.alloc_register());
    let one = body.add_int(1);
    body.set_line(3);
    body.emit_load_const(b0, one);
    body.emit_store_name(size, b0);
    body.set_line(4);
    body.emit_load_name(b0, size);
    body.emit_add(b0, b0, b0);
    body.emit_store_name(doubled, b0);
    body.set_line(5);

    let mut area = FunctionBuilder::nested(&body, "area");
    area.set_arg_count(1);
    area.define_local("self");
    let global_size = area.add_name("size");
    let a0 = area.alloc_register();
    area.set_line(6);
    area.emit_load_global(a0, global_size);
    area.emit_mul(a0, a0, a0);
    area.emit_return(a0);
    let area = body.add_code_object(Arc::new(area.finish().expect("area")));
    body.emit_make_function(b1, area);
    body.emit_return_none();

    let body = make.add_code_object(Arc::new(body.finish().expect("Box")));
    let r0 = make.alloc_register();
    make.emit_make_function(r0, body);
    make.emit_return(r0);
    let code = make.finish().expect("make");

    let set = extract(&code).expect("extract");
    assert_eq!(set.len(), 1);
    let record = set.get("size", AccessKind::Global).expect("size is global");
    assert_eq!(&*record.location.qualname, "make.<locals>.Box.area");
    assert_eq!(record.location.line, 6);
}

#[test]
fn test_defaults_belong_to_the_enclosing_frame() {
    // def f():
    //     def g(x=default):
    //         return x
    //     return g
    let mut f = function("f");
    let default = f.add_name("default");
    let r0 = f.alloc_register();
    f.set_line(2);
    f.emit_load_global(r0, default);

    let mut g = FunctionBuilder::nested(&f, "g");
    g.set_arg_count(1);
    let x = g.define_local("x");
    let g0 = g.alloc_register();
    g.emit_load_local(g0, x);
    g.emit_return(g0);
    let g = f.add_code_object(Arc::new(g.finish().expect("g")));
    f.emit_make_function(r0, g);
    f.emit_return(r0);
    let code = f.finish().expect("f");

    let set = extract(&code).expect("extract");
    let record = set.get("default", AccessKind::Global).expect("default");
    assert_eq!(record.location.depth, 0);
    assert_eq!(&*record.location.qualname, "f");
}

#[test]
fn test_read_before_assignment_is_local() {
    // def f():
    //     print(x)
    //     x = 1
    let mut f = function("f");
    let x = f.define_local("x");
    let print = f.add_name("print");
    let (r0, r1) = (f.alloc_register(), f.alloc_register());
    f.emit_load_global(r0, print);
    f.emit_load_local(r1, x);
    f.emit_call(r0, r0, 1);
    let one = f.add_int(1);
    f.emit_load_const(r0, one);
    f.emit_store_local(x, r0);
    f.emit_return_none();
    let code = f.finish().expect("f");

    let set = extract(&code).expect("extract");
    assert_eq!(set.names(AccessKind::Global), vec!["print"]);
    assert!(set.names(AccessKind::Free).is_empty());
}

#[test]
fn test_global_stores_are_not_reads() {
    // def bump():
    //     global counter
    //     counter = 0
    let mut f = function("bump");
    let counter = f.add_name("counter");
    let r0 = f.alloc_register();
    let zero = f.add_int(0);
    f.emit_load_const(r0, zero);
    f.emit_store_global(counter, r0);
    f.emit_return_none();
    let code = f.finish().expect("bump");

    assert!(extract(&code).unwrap().is_empty());
}

// =============================================================================
// Locations
// =============================================================================

#[test]
fn test_innermost_site_wins() {
    // def f(xs):
    //     total = scale
    //     return [x * scale for x in xs]
    let mut f = function("f");
    f.set_arg_count(1);
    f.define_local("xs");
    let total = f.define_local("total");
    let scale = f.add_name("scale");
    let r0 = f.alloc_register();
    f.set_line(2);
    f.emit_load_global(r0, scale);
    f.emit_store_local(total, r0);
    f.set_line(3);
    let comp = list_comprehension(&f, |comp, item| {
        let scale = comp.add_name("scale");
        let tmp = comp.alloc_register();
        comp.emit_load_global(tmp, scale);
        comp.emit_mul(item, item, tmp);
    });
    let comp = f.add_code_object(comp);
    f.emit_make_function(r0, comp);
    f.emit_return(r0);
    let code = f.finish().expect("f");

    let set = extract(&code).expect("extract");
    let record = set.get("scale", AccessKind::Global).unwrap();
    assert_eq!(record.location.depth, 1);
    assert_eq!(record.location.line, 3);
    assert_eq!(&*record.location.qualname, "f.<locals>.<listcomp>");
    assert_eq!(&*record.location.filename, "extract.py");
}

#[test]
fn test_generator_expression_reads_are_reported() {
    // def f(xs):
    //     return any(limit for x in xs if not x)
    let mut f = function("f");
    f.set_arg_count(1);
    let xs = f.define_local("xs");
    f.set_line(2);

    let mut genexpr = FunctionBuilder::nested(&f, "<genexpr>");
    genexpr.add_flags(CodeFlags::GENERATOR | CodeFlags::COMPREHENSION);
    genexpr.set_arg_count(1);
    let iter = genexpr.define_local(".0");
    let x = genexpr.define_local("x");
    let limit = genexpr.add_name("limit");
    let (item, value) = (genexpr.alloc_register(), genexpr.alloc_register());
    let top = genexpr.create_label();
    let done = genexpr.create_label();
    genexpr.emit_load_local(item, iter);
    genexpr.bind_label(top);
    genexpr.emit_for_iter(item, done);
    genexpr.emit_store_local(x, item);
    genexpr.emit_jump_if_true(item, top);
    genexpr.emit_load_global(value, limit);
    genexpr.emit_yield(value);
    genexpr.emit_jump(top);
    genexpr.bind_label(done);
    genexpr.emit_return_none();
    let genexpr = f.add_code_object(Arc::new(genexpr.finish().expect("genexpr")));

    let any = f.add_name("any");
    let (r0, r1, r2) = (f.alloc_register(), f.alloc_register(), f.alloc_register());
    f.emit_load_global(r0, any);
    f.emit_make_function(r1, genexpr);
    f.emit_load_local(r2, xs);
    f.emit_get_iter(r2, r2);
    f.emit_call(r1, r1, 1);
    f.emit_call(r0, r0, 1);
    f.emit_return(r0);
    let code = f.finish().expect("f");

    let set = extract(&code).expect("extract");
    assert_eq!(set.names(AccessKind::Global), vec!["any", "limit"]);
    let record = set.get("limit", AccessKind::Global).unwrap();
    assert_eq!(record.location.depth, 1);
    assert_eq!(record.location.line, 2);
    assert_eq!(&*record.location.qualname, "f.<locals>.<genexpr>");
    assert!(!set.contains("x", AccessKind::Global));
}

#[test]
fn test_innermost_site_keeps_outer_attribute_chain() {
    // def f():
    //     solve = np.linalg
    //     def inner():
    //         return np
    let mut f = function("f");
    let solve = f.define_local("solve");
    let np = f.add_name("np");
    let linalg = f.add_name("linalg");
    let r0 = f.alloc_register();
    f.set_line(2);
    f.emit_load_global(r0, np);
    f.emit_get_attr(r0, r0, linalg);
    f.emit_store_local(solve, r0);

    f.set_line(3);
    let mut inner = FunctionBuilder::nested(&f, "inner");
    let np_inner = inner.add_name("np");
    let i0 = inner.alloc_register();
    inner.set_line(4);
    inner.emit_load_global(i0, np_inner);
    inner.emit_return(i0);
    let inner = f.add_code_object(Arc::new(inner.finish().expect("inner")));
    f.emit_make_function(r0, inner);
    f.emit_return(r0);
    let code = f.finish().expect("f");

    let set = extract(&code).expect("extract");
    let record = set.get("np", AccessKind::Global).unwrap();
    assert_eq!(record.location.depth, 1);
    assert_eq!(record.location.line, 4);
    assert_eq!(&*record.location.qualname, "f.<locals>.inner");
    assert_eq!(record.dotted(), "np.linalg");
}

// =============================================================================
// Failures
// =============================================================================

#[test]
fn test_unanalyzable_nested_code_fails() {
    let mut f = function("f");
    let mut inner = FunctionBuilder::nested(&f, "inner");
    inner.emit(Instruction::from_raw(0xee00_0000));
    let inner = f.add_code_object(Arc::new(inner.finish().expect("inner")));
    let r0 = f.alloc_register();
    f.emit_make_function(r0, inner);
    f.emit_return(r0);
    let code = f.finish().expect("f");

    match extract(&code) {
        Err(ExtractError::UnknownOpcode { qualname, opcode, .. }) => {
            assert_eq!(&*qualname, "f.<locals>.inner");
            assert_eq!(opcode, 0xee);
        }
        other => panic!("expected UnknownOpcode, got {other:?}"),
    }
}

#[test]
fn test_extraction_is_deterministic() {
    let mut f = function("f");
    let a = f.add_name("a");
    let b = f.add_name("b");
    let r0 = f.alloc_register();
    f.emit_load_global(r0, b);
    f.emit_load_global(r0, a);
    f.emit_return(r0);
    let code = f.finish().expect("f");

    assert_eq!(extract(&code).unwrap(), extract(&code).unwrap());
}

#[test]
fn test_disassembly_includes_nested_code() {
    let mut f = function("f");
    f.set_arg_count(1);
    f.define_local("xs");
    let comp = list_comprehension(&f, |_, _| {});
    let comp = f.add_code_object(comp);
    let r0 = f.alloc_register();
    f.emit_make_function(r0, comp);
    f.emit_return(r0);
    let code = f.finish().expect("f");

    let listing = disassemble(&code);
    assert!(listing.contains("Code object: f (f)"));
    assert!(listing.contains("Code object: <listcomp> (f.<locals>.<listcomp>)"));
    assert!(listing.contains("ForIter"));
}
