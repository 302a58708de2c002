//! Real-hardware validation of the OpenCL backend.
#![cfg(feature = "opencl")]

use clsparse_opencl::cl::ClQueue;
use clsparse_opencl::{
    ApiVersion, ClsparseConfig, DeviceScalar, DeviceVector, KernelCache, Session, dscale, sscale,
};

fn open() -> ClQueue {
    let config = ClsparseConfig::from_env().expect("config from environment");
    ClQueue::from_config(&config).expect("OpenCL device")
}

#[test]
#[ignore = "requires OpenCL runtime - run with --ignored on GPU machine"]
fn smoke_sscale_kernel_path() {
    let queue = open();
    let cache = KernelCache::new();
    let mut values = queue.create_buffer(&[1.0f32, 2.0, 3.0, 4.0]).unwrap();
    let alpha = queue.create_buffer(&[2.0f32]).unwrap();

    let session = Session::new(&queue, &cache).with_api_version(ApiVersion::OPENCL_2_0);
    let mut vector = DeviceVector::<ClQueue, f32>::new(&mut values, 4);
    let scalar = DeviceScalar::<ClQueue, f32>::new(&alpha);
    let session = sscale(&mut vector, &scalar, session).unwrap();

    let host = queue.read(&values, 4, session.wait_list()).unwrap();
    assert_eq!(host, vec![2.0, 4.0, 6.0, 8.0]);
}

#[test]
#[ignore = "requires OpenCL runtime - run with --ignored on GPU machine"]
fn smoke_dscale_zero_fill() {
    let queue = open();
    let cache = KernelCache::new();
    let mut values = queue.create_buffer(&[1.0f64, 2.0, 3.0]).unwrap();
    let alpha = queue.create_buffer(&[0.0f64]).unwrap();

    let session = Session::new(&queue, &cache).with_api_version(ApiVersion::OPENCL_2_0);
    let mut vector = DeviceVector::<ClQueue, f64>::new(&mut values, 3);
    let scalar = DeviceScalar::<ClQueue, f64>::new(&alpha);
    let event = dscale(&mut vector, &scalar, session).unwrap().into_completion_event().unwrap();
    event.wait().unwrap();

    assert_eq!(queue.read(&values, 3, &[]).unwrap(), vec![0.0, 0.0, 0.0]);
    assert!(cache.is_empty());
}
