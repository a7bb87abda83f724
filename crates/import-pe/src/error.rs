#[derive(Debug, thiserror::Error)]
pub enum PeError {
    #[error("not large enough to hold a DOS header")]
    TooShortForDosHeader,
    #[error("no recognized DOS signature")]
    NotDosSigned,
    #[error("e_lfanew {0:#x} is out of bounds for a stream of length {1}")]
    ELfanewOutOfBounds(u32, u64),
    #[error("NT signature (PE\\0\\0) not found at e_lfanew")]
    NotPeSigned,
    #[error("NumberOfSections {0:#x} exceeds the defensive cap of 0x100")]
    TooManySections(u16),
    #[error("section table extends past the end of the stream")]
    SectionTableOutOfBounds,
}
