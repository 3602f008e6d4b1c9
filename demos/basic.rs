//! Basic example demonstrating handle registry usage.
//!
//! The native engine is simulated by a few stub functions that print
//! what they are asked to do.
//!
//! Run with: cargo run --example basic

use std::os::raw::c_void;
use std::ptr;
use std::sync::Arc;

use handles::ffi::{EVENT_END, KIND_CHANNEL};
use handles::{
    Channel, InvalidationChannel, RawHandle, Registry, ReleaseOps, ReleaseTable, ResultCode,
    Sound, System,
};

unsafe fn release(raw: RawHandle) -> ResultCode {
    println!("  [engine] release {}", raw);
    0
}

unsafe fn get_user_data(_raw: RawHandle, out: *mut *mut c_void) -> ResultCode {
    *out = ptr::null_mut();
    0
}

unsafe fn set_user_data(raw: RawHandle, data: *mut c_void) -> ResultCode {
    println!("  [engine] user data of {} = {:p}", raw, data);
    0
}

fn main() -> handles::Result<()> {
    let ops = unsafe { ReleaseOps::new(release, get_user_data, set_user_data) };
    let registry = Registry::new(ReleaseTable::uniform(ops));

    let guard = InvalidationChannel::new(registry.clone()).install();
    let callback = guard.callback();

    println!("--- Wrapping ---");
    let Some(system) = registry.wrap::<System>(RawHandle::from_raw(0x1000))? else {
        return Ok(());
    };
    let Some(sound) = registry.wrap::<Sound>(RawHandle::from_raw(0x2000))? else {
        return Ok(());
    };
    let again = registry.wrap::<Sound>(sound.raw())?;
    println!("System: {:?}", system);
    println!(
        "Same sound wrapper on second lookup: {}",
        again.is_some_and(|again| Arc::ptr_eq(&sound, &again))
    );
    sound.set_user_data(0x51 as *mut c_void)?;

    println!("\n--- Engine callback ---");
    let voice_raw = RawHandle::from_raw(0x3000);
    let Some(voice) = registry.wrap::<Channel>(voice_raw)? else {
        return Ok(());
    };
    voice.set_event_handler(|channel, event| {
        println!("  [app] {} received {:?}", channel.handle(), event);
    });
    let code = unsafe {
        callback(
            voice_raw.as_ptr(),
            KIND_CHANNEL,
            EVENT_END,
            ptr::null_mut(),
            ptr::null_mut(),
        )
    };
    println!("Callback returned {}", code);
    println!("Voice state after end: {:?}", voice.state());
    if let Err(err) = voice.user_data() {
        println!("Voice access: {}", err);
    }

    println!("\n--- Disposing ---");
    sound.dispose()?;
    sound.dispose()?;
    println!("Sound state: {:?}", sound.state());
    println!("Registry: {:?}", registry.report());

    // System is released when its last reference goes away
    drop(system);
    println!("\n--- Done ---");
    Ok(())
}
