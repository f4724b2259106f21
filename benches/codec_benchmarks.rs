//! Benchmarks for the hot codec paths: ABI encode/decode and unit
//! conversion, both on the per-transaction dispatch path.

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use alloy::dyn_abi::DynSolValue;
use alloy::primitives::{Address, U256};
use std::str::FromStr;

use evm_block_relayer::infra::rpc::units::{ether_to_wei, hex_to_number, wei_to_ether};
use evm_block_relayer::infra::rpc::FunctionRegistry;

fn bench_abi(c: &mut Criterion) {
    let registry = FunctionRegistry::standard();
    let recipient = Address::from_str("0xac05d75850dfed2d94a940fcb60b038818ad9a7e").unwrap();
    let amount = U256::from(100_000_000_000_000_000_u64);
    let encoded = registry
        .encode_call_hex(
            "mint",
            &[
                DynSolValue::Address(recipient),
                DynSolValue::Uint(amount, 256),
            ],
        )
        .unwrap();

    c.bench_function("abi_encode_mint", |b| {
        b.iter(|| {
            registry
                .encode_call_hex(
                    "mint",
                    &[
                        DynSolValue::Address(black_box(recipient)),
                        DynSolValue::Uint(black_box(amount), 256),
                    ],
                )
                .unwrap()
        })
    });

    c.bench_function("abi_decode_input", |b| {
        b.iter(|| registry.decode_input(black_box(&encoded)).unwrap())
    });
}

fn bench_units(c: &mut Criterion) {
    c.bench_function("ether_to_wei", |b| {
        b.iter(|| ether_to_wei(black_box("12.345678901234567")).unwrap())
    });

    c.bench_function("wei_to_ether", |b| {
        let wei = U256::from(123_456_789_012_345_678_u64);
        b.iter(|| wei_to_ether(black_box(wei)))
    });

    c.bench_function("hex_to_number", |b| {
        b.iter(|| hex_to_number(black_box("0x16345785d")).unwrap())
    });
}

criterion_group!(benches, bench_abi, bench_units);
criterion_main!(benches);
