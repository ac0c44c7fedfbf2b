pub mod storage;

pub struct Request;

impl Request {
    pub fn handle(&self) -> u32 {
        storage::Store::fetch()
    }
}
