use std::hint::black_box;

use tracing::info;

#[cfg(target_os = "linux")]
extern "C" {
    static etext: u8;
    static edata: u8;
    static end: u8;
}

/// Where the segments of the running process end, printed before the first allocation
/// so that the addresses handed out by malloc can be put into context.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Layout {
    pub program_break: usize,
    pub stack: usize,
    pub sections: Option<Sections>,
}

/// First addresses past the program text, initialized data and uninitialized data.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Sections {
    pub text: usize,
    pub data: usize,
    pub bss: usize,
}

impl Layout {
    pub(crate) fn current() -> Self {
        let first_byte: u8 = black_box(0xff);
        let program_break = unsafe { libc::sbrk(0) } as usize;
        Layout {
            program_break,
            stack: &first_byte as *const u8 as usize,
            sections: sections(),
        }
    }

    pub(crate) fn report(&self) {
        info!("program break according to sbrk() at {:#x}", self.program_break);
        info!("first byte on the stack is at {:#x}", self.stack);
        if let Some(sections) = &self.sections {
            info!("first address past program text (etext) {:#x}", sections.text);
            info!("first address past initialized data (edata) {:#x}", sections.data);
            info!("first address past uninitialized data (end) {:#x}", sections.bss);
        }
    }
}

#[cfg(target_os = "linux")]
fn sections() -> Option<Sections> {
    Some(Sections {
        text: std::ptr::addr_of!(etext) as usize,
        data: std::ptr::addr_of!(edata) as usize,
        bss: std::ptr::addr_of!(end) as usize,
    })
}

#[cfg(not(target_os = "linux"))]
fn sections() -> Option<Sections> {
    None
}
