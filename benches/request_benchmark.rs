use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use staticd::filter::RequestFilter;
use staticd::param::HttpRequestMethod;
use staticd::request::Request;
use staticd::util::normalize_request_path;

fn simple_request_parse_benchmark(c: &mut Criterion) {
    let request = b"GET / HTTP/1.1\r\nHost: localhost:8080\r\nUser-Agent: Test\r\n\r\n";

    c.bench_function("simple_request_parse", |b| {
        b.iter(|| Request::try_from(black_box(request), 0).unwrap());
    });
}

fn complex_request_parse_benchmark(c: &mut Criterion) {
    let request = b"GET /path/to/resource?id=123&name=test HTTP/1.1\r\n\
                    Host: localhost:8080\r\n\
                    User-Agent: Mozilla/5.0 (Windows NT 10.0; Win64; x64)\r\n\
                    Accept: text/html,application/xhtml+xml\r\n\
                    Accept-Language: en-US,en;q=0.9\r\n\
                    Connection: keep-alive\r\n\
                    Upgrade-Insecure-Requests: 1\r\n\
                    \r\n";

    c.bench_function("complex_request_parse", |b| {
        b.iter(|| Request::try_from(black_box(request), 0).unwrap());
    });
}

fn malformed_request_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("malformed_request");

    let requests = [
        ("no_version", b"GET /index.html\r\n\r\n".as_slice()),
        ("bad_version", b"GET / HTTP/2.0\r\n\r\n".as_slice()),
        ("not_utf8", b"GET /\xff\xfe HTTP/1.1\r\n\r\n".as_slice()),
    ];

    for (name, request) in requests.iter() {
        group.bench_with_input(BenchmarkId::from_parameter(name), request, |b, request| {
            b.iter(|| Request::try_from(black_box(request), 0).is_err());
        });
    }

    group.finish();
}

fn normalize_path_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("normalize_path");

    for (name, path) in [
        ("plain", "/css/site.css"),
        ("encoded", "/docs/%E4%B8%AD%E6%96%87/%2e%2e/guide.txt"),
        ("deep", "/a/b/c/d/e/f/g/h/i/j/k/l/m/n/o/p/index.html"),
    ] {
        group.bench_with_input(BenchmarkId::from_parameter(name), path, |b, path| {
            b.iter(|| normalize_request_path(black_box(path)));
        });
    }

    group.finish();
}

fn filter_check_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("filter_check");

    for count in [0usize, 10, 100] {
        let exclusions: Vec<String> = (0..count).map(|i| format!(".ext{}", i)).collect();
        let filter = RequestFilter::new(&exclusions);
        group.bench_with_input(BenchmarkId::from_parameter(count), &filter, |b, filter| {
            b.iter(|| filter.check(HttpRequestMethod::Get, black_box("/assets/app.min.js")));
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    simple_request_parse_benchmark,
    complex_request_parse_benchmark,
    malformed_request_benchmark,
    normalize_path_benchmark,
    filter_check_benchmark
);
criterion_main!(benches);
