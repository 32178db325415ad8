use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use grid_layout::{distribute_into_columns, extract_items, flatten_columns, ColumnClasses, Document};

fn populated(items: usize) -> (Document, usize) {
    let mut doc = Document::new();
    let grid = doc.create_element("div");
    let root = doc.root();
    doc.append_child(root, grid).unwrap();
    for _ in 0..items {
        let item = doc.create_element("div");
        doc.append_child(grid, item).unwrap();
    }
    (doc, grid)
}

fn relayout(c: &mut Criterion) {
    let mut group = c.benchmark_group("relayout");
    for items in [12usize, 240, 2400] {
        group.bench_with_input(BenchmarkId::from_parameter(items), &items, |b, &items| {
            let (mut doc, grid) = populated(items);
            let holder = extract_items(&mut doc, grid).unwrap();
            distribute_into_columns(&mut doc, grid, holder, 3, &ColumnClasses::default_for(3)).unwrap();
            doc.remove_subtree(holder).unwrap();

            let mut columns = 3;
            b.iter(|| {
                let flat = flatten_columns(&mut doc, grid).unwrap();
                columns = if columns == 3 { 4 } else { 3 };
                let classes = ColumnClasses::default_for(columns);
                black_box(distribute_into_columns(&mut doc, grid, flat, columns, &classes).unwrap());
                doc.remove_subtree(flat).unwrap();
            });
        });
    }
    group.finish();
}

criterion_group!(benches, relayout);
criterion_main!(benches);
