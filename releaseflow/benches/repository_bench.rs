//! Benchmarks for repository generation.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use releaseflow::core::{compare_versions, ArtifactCoordinate, ArtifactRef};
use releaseflow::stages::deduplicate;

fn artifacts(components: usize, versions: usize) -> Vec<ArtifactRef> {
    let mut artifacts = Vec::with_capacity(components * versions * 2);
    for component in 0..components {
        let artifact_id = format!("component-{component}");
        for version in 0..versions {
            let version = format!("1.{version}.0.redhat-{:05}", version + 1);
            for extension in ["jar", "pom"] {
                let coordinate =
                    ArtifactCoordinate::new("org.example", &artifact_id, &version, extension);
                let location = coordinate.repository_path();
                artifacts.push(ArtifactRef::new(coordinate, location));
            }
        }
    }
    artifacts
}

fn deduplicate_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("deduplicate");
    for (components, versions) in [(10, 3), (100, 5), (500, 10)] {
        let input = artifacts(components, versions);
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{components}x{versions}")),
            &input,
            |b, input| b.iter(|| deduplicate(black_box(input.clone()))),
        );
    }
    group.finish();
}

fn version_benchmark(c: &mut Criterion) {
    c.bench_function("compare_versions", |b| {
        b.iter(|| {
            compare_versions(
                black_box("1.10.0.redhat-00012"),
                black_box("1.9.3.redhat-00040"),
            )
        });
    });
}

criterion_group!(benches, deduplicate_benchmark, version_benchmark);
criterion_main!(benches);
